use std::{
    collections::VecDeque,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use axum::{
    extract::Path,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use jukebox_collab::{OnChange, Subscription};
use jukebox_core::{Room as CoreRoom, RoomId};
use log::debug;
use parking_lot::Mutex;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{Room, ToSerialized},
    Router,
};

/// Streams every snapshot of a room to one client, starting with the current one.
pub struct RoomEventStream {
    pending_messages: Arc<Mutex<VecDeque<CoreRoom>>>,
    waker: Arc<Mutex<Option<Waker>>>,
    /// Unsubscribes when the client disconnects
    subscription: Subscription,
}

impl RoomEventStream {
    async fn open(context: &ServerContext, id: &RoomId) -> ServerResult<Self> {
        let room = context.collab.rooms.get_room(id).await?;

        let pending_messages = Arc::new(Mutex::new(VecDeque::from([room])));
        let waker: Arc<Mutex<Option<Waker>>> = Default::default();

        let on_change: OnChange = {
            let pending_messages = pending_messages.clone();
            let waker = waker.clone();

            Arc::new(move |room: CoreRoom| {
                let mut pending = pending_messages.lock();
                pending.push_back(room);

                if let Some(waker) = waker.lock().take() {
                    waker.wake()
                }
            })
        };

        let subscription = context
            .collab
            .context()
            .transports()
            .subscribe(id, on_change)
            .await
            .map_err(jukebox_collab::RoomError::from)?;

        // Finish the stream once the room is gone
        subscription.on_end({
            let waker = waker.clone();

            move || {
                if let Some(waker) = waker.lock().take() {
                    waker.wake()
                }
            }
        });

        debug!(
            "Streaming room {} over {} ({})",
            id,
            subscription.kind(),
            subscription.id()
        );

        Ok(Self {
            pending_messages,
            waker,
            subscription,
        })
    }
}

impl Stream for RoomEventStream {
    type Item = Result<Event, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        if let Some(room) = pending_messages.pop_front() {
            let serialized: Room = room.to_serialized();
            return Poll::Ready(Some(Event::default().event("room").json_data(serialized)));
        }

        // Registered before the check so an end in between still wakes us
        *self.waker.lock() = Some(cx.waker().clone());

        if !self.subscription.is_active() {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/events",
    tag = "rooms",
    params(("id" = String, Path, description = "The room code, in any case")),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A `room` event with the full room, on connect and on every change",
            body = Room
        ),
        (status = 404, description = "The room does not exist")
    )
)]
async fn room_events(
    context: ServerContext,
    Path(id): Path<String>,
) -> ServerResult<Sse<RoomEventStream>> {
    let id = RoomId::parse(&id)?;
    let stream = RoomEventStream::open(&context, &id).await?;

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub fn router() -> Router {
    Router::new().route("/:id/events", get(room_events))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::StreamExt;
    use jukebox_collab::{BroadcastRegistry, Collab, LocalCache, MemoryStore, TransportKind};
    use jukebox_core::{Config, RoomId, RoomUpdate};

    use super::RoomEventStream;
    use crate::context::ServerContext;

    #[tokio::test]
    async fn streams_current_room_then_changes() {
        let dir = tempfile::tempdir().unwrap();
        let collab = Collab::new(
            Arc::new(MemoryStore::default()),
            LocalCache::new(dir.path()).unwrap(),
            BroadcastRegistry::new(),
            Config::default(),
        );
        let context = ServerContext::new(Arc::new(collab));

        let room = context
            .collab
            .rooms
            .create_room(None, "Party", "u1")
            .await
            .unwrap();

        let mut stream = RoomEventStream::open(&context, &room.id).await.unwrap();
        assert_eq!(stream.subscription.kind(), TransportKind::Push);
        assert_eq!(stream.pending_messages.lock().len(), 1);

        assert!(stream.next().await.unwrap().is_ok());

        let update = RoomUpdate {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        context.collab.rooms.update_room(&room.id, update).await.unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.pending_messages.lock().is_empty());

        let missing = RoomId::parse("ZZZZZZ").unwrap();
        assert!(RoomEventStream::open(&context, &missing).await.is_err());
    }

    #[tokio::test]
    async fn ends_when_the_room_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let collab = Collab::new(
            Arc::new(MemoryStore::default()),
            LocalCache::new(dir.path()).unwrap(),
            BroadcastRegistry::new(),
            Config::default(),
        );
        let context = ServerContext::new(Arc::new(collab));

        let room = context
            .collab
            .rooms
            .create_room(None, "Party", "u1")
            .await
            .unwrap();

        let mut stream = RoomEventStream::open(&context, &room.id).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());

        let waiting = tokio::spawn(async move { stream.next().await.is_none() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        context.collab.rooms.delete_room(&room.id).await.unwrap();

        let ended = tokio::time::timeout(std::time::Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert!(ended);
    }
}
