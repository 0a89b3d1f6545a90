//! Delivery of room changes to subscribers.
//!
//! Three strategies exist: push from the store, polling the store, and a local broadcast
//! between clients on the same host. The [TransportFactory] picks the first one that works.

mod local;
mod polling;
mod push;

use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use jukebox_core::{handle_id, Room, RoomId};
use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;

pub use local::*;
pub use polling::*;
pub use push::*;

use crate::{CollabContext, CollabEvent, StoreError};

/// Called with every new snapshot of a room.
pub type OnChange = Arc<dyn Fn(Room) + Send + Sync>;

handle_id! {
    pub struct SubscriptionId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Push,
    Polling,
    Local,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("The {0} store cannot push changes")]
    Unsupported(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A strategy for delivering room changes.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn subscribe(
        &self,
        id: &RoomId,
        on_change: OnChange,
    ) -> Result<Subscription, TransportError>;
}

/// A handle to an active subscription. Unsubscribes when dropped.
pub struct Subscription {
    id: SubscriptionId,
    room_id: RoomId,
    kind: TransportKind,
    end: SubscriptionEnd,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

type EndCallback = Box<dyn FnOnce() + Send>;

/// Lets a transport signal that it will deliver nothing more, for example
/// because the room was deleted.
#[derive(Clone, Default)]
pub struct SubscriptionEnd {
    state: Arc<Mutex<EndState>>,
}

#[derive(Default)]
struct EndState {
    closed: bool,
    callbacks: Vec<EndCallback>,
}

impl SubscriptionEnd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the subscription as finished and runs every end callback once.
    pub fn close(&self) {
        let callbacks = {
            let mut state = self.state.lock();

            if state.closed {
                return;
            }

            state.closed = true;
            std::mem::take(&mut state.callbacks)
        };

        for callback in callbacks {
            callback()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn on_close(&self, callback: EndCallback) {
        let mut state = self.state.lock();

        if state.closed {
            drop(state);
            callback()
        } else {
            state.callbacks.push(callback)
        }
    }
}

impl Subscription {
    pub fn new(
        room_id: RoomId,
        kind: TransportKind,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self::with_end(room_id, kind, SubscriptionEnd::new(), release)
    }

    /// A subscription the transport may end on its own through `end`.
    pub fn with_end(
        room_id: RoomId,
        kind: TransportKind,
        end: SubscriptionEnd,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            room_id,
            kind,
            end,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The strategy delivering this subscription
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// False once unsubscribed, or once the transport has nothing more to deliver.
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some() && !self.end.is_closed()
    }

    /// Runs `callback` when the transport ends the subscription.
    /// It runs right away if that already happened.
    pub fn on_end(&self, callback: impl FnOnce() + Send + 'static) {
        self.end.on_close(Box::new(callback))
    }

    /// Stops delivery and releases every listener and task. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();

        if let Some(release) = release {
            release()
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe()
    }
}

/// Tries every strategy in order until one subscribes successfully.
pub struct TransportFactory {
    strategies: Vec<Box<dyn Transport>>,
    context: Option<CollabContext>,
}

impl TransportFactory {
    /// Push, then polling, then local broadcast.
    pub fn new(context: &CollabContext) -> Self {
        let strategies: Vec<Box<dyn Transport>> = vec![
            Box::new(PushTransport::new(context.store.clone())),
            Box::new(PollingTransport::new(
                context.store.clone(),
                context.config.poll_interval(),
            )),
            Box::new(LocalTransport::new(context.registry.clone())),
        ];

        Self {
            strategies,
            context: Some(context.clone()),
        }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn Transport>>) -> Self {
        Self {
            strategies,
            context: None,
        }
    }

    pub async fn subscribe(
        &self,
        id: &RoomId,
        on_change: OnChange,
    ) -> Result<Subscription, TransportError> {
        let mut last_error = TransportError::Unsupported("empty");

        for strategy in &self.strategies {
            match strategy.subscribe(id, on_change.clone()).await {
                Ok(subscription) => {
                    info!("Subscribed to room {} via {}", id, subscription.kind());

                    if let Some(context) = &self.context {
                        context.emit(CollabEvent::Subscribed {
                            room_id: id.clone(),
                            kind: subscription.kind(),
                        });
                    }

                    return Ok(subscription);
                }
                Err(e) => {
                    warn!(
                        "Could not subscribe to room {} via {}, falling back: {}",
                        id,
                        strategy.kind(),
                        e
                    );

                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Push => "push",
            Self::Polling => "polling",
            Self::Local => "local broadcast",
        };

        f.write_str(name)
    }
}
