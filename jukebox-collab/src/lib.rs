mod cache;
mod events;
mod identity;
mod rooms;
mod store;
mod sync;
mod transport;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use cache::*;
pub use events::*;
pub use identity::*;
pub use rooms::*;
pub use store::*;
pub use sync::*;
pub use transport::*;

use jukebox_core::Config;

/// The jukebox collab system, facilitating room management, subscriptions, and sync play.
pub struct Collab {
    context: CollabContext,

    pub rooms: RoomManager,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub store: SharedStore,
    pub cache: Arc<LocalCache>,
    pub registry: Arc<BroadcastRegistry>,
    pub config: Arc<Config>,

    events: EventSender,
    receiver: EventReceiver,
}

impl Collab {
    pub fn new(
        store: SharedStore,
        cache: LocalCache,
        registry: BroadcastRegistry,
        config: Config,
    ) -> Self {
        let context = CollabContext::new(store, cache, registry, config);
        let rooms = RoomManager::new(&context);

        Self { context, rooms }
    }

    pub fn context(&self) -> &CollabContext {
        &self.context
    }

    /// Returns a receiver of every event emitted by the collab system
    pub fn events(&self) -> EventReceiver {
        self.context.events()
    }
}

impl CollabContext {
    pub fn new(
        store: SharedStore,
        cache: LocalCache,
        registry: BroadcastRegistry,
        config: Config,
    ) -> Self {
        let (events, receiver) = crossbeam::channel::unbounded();

        Self {
            store,
            cache: Arc::new(cache),
            registry: Arc::new(registry),
            config: Arc::new(config),
            events,
            receiver,
        }
    }

    pub fn emit(&self, event: CollabEvent) {
        // The context owns a receiver, so this only fails while shutting down
        let _ = self.events.send(event);
    }

    pub fn events(&self) -> EventReceiver {
        self.receiver.clone()
    }

    /// The default strategies for subscribing to rooms in this context
    pub fn transports(&self) -> TransportFactory {
        TransportFactory::new(self)
    }
}
