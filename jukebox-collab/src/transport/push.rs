use async_trait::async_trait;
use futures_util::StreamExt;
use jukebox_core::RoomId;
use log::debug;

use crate::SharedStore;

use super::{OnChange, Subscription, SubscriptionEnd, Transport, TransportError, TransportKind};

/// Delivers the snapshots a push capable store emits.
pub struct PushTransport {
    store: SharedStore,
}

impl PushTransport {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Transport for PushTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    async fn subscribe(
        &self,
        id: &RoomId,
        on_change: OnChange,
    ) -> Result<Subscription, TransportError> {
        let mut watch = self
            .store
            .watch(id)
            .await?
            .ok_or_else(|| TransportError::Unsupported(self.store.name()))?;

        let end = SubscriptionEnd::new();

        let room_id = id.clone();
        let task = tokio::spawn({
            let end = end.clone();

            async move {
                while let Some(room) = watch.next().await {
                    on_change(room);
                }

                debug!("Push channel for room {} closed", room_id);
                end.close();
            }
        });

        Ok(Subscription::with_end(
            id.clone(),
            TransportKind::Push,
            end,
            move || task.abort(),
        ))
    }
}
