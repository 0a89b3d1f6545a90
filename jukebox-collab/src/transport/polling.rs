use std::time::Duration;

use async_trait::async_trait;
use jukebox_core::RoomId;
use log::debug;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::{SharedStore, StoreError};

use super::{OnChange, Subscription, SubscriptionEnd, Transport, TransportError, TransportKind};

/// Reads the whole room on an interval and delivers it when it changed.
pub struct PollingTransport {
    store: SharedStore,
    interval: Duration,
}

impl PollingTransport {
    pub fn new(store: SharedStore, interval: Duration) -> Self {
        Self { store, interval }
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn subscribe(
        &self,
        id: &RoomId,
        on_change: OnChange,
    ) -> Result<Subscription, TransportError> {
        // The first read decides whether the store is reachable at all
        let mut last = match self.store.get(id).await {
            Ok(room) => Some(room),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let store = self.store.clone();
        let room_id = id.clone();
        let period = self.interval;
        let end = SubscriptionEnd::new();
        let closer = end.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                match store.get(&room_id).await {
                    Ok(room) if last.as_ref() != Some(&room) => {
                        last = Some(room.clone());
                        on_change(room);
                    }
                    Ok(_) => {}
                    // A room that existed and is now gone was deleted
                    Err(StoreError::NotFound(_)) if last.is_some() => {
                        debug!("Room {} is gone, polling stopped", room_id);
                        closer.close();
                        break;
                    }
                    Err(e) => debug!("Polling room {} failed: {}", room_id, e),
                }
            }
        });

        Ok(Subscription::with_end(
            id.clone(),
            TransportKind::Polling,
            end,
            move || task.abort(),
        ))
    }
}
