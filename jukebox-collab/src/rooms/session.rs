use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Weak,
};

use jukebox_core::{
    membership, now_millis, queuing,
    sync::{ControlError, SyncCoordinator, SyncRole},
    MemberId, QueueItem, QueueItemKey, Room, RoomId, RoomUpdate, Timestamp, VideoRef,
    VoteDirection,
};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use super::{RoomError, RoomManager, RoomResult};
use crate::{CollabContext, CollabEvent, OnChange, Subscription, TransportKind};

/// A member's live view of a room.
///
/// Actions are applied to the local copy right away and persisted in the order they were issued.
/// Snapshots from the subscription replace the local copy once no write is in flight.
pub struct RoomSession {
    inner: Arc<SessionInner>,
    subscription: Subscription,
    writer: JoinHandle<()>,
}

struct SessionInner {
    room_id: RoomId,
    member: MemberId,
    context: CollabContext,
    room: Mutex<Room>,
    /// Writes issued but not resolved yet
    pending: AtomicUsize,
    changes: watch::Sender<Room>,
    writes: mpsc::UnboundedSender<PendingWrite>,
    /// Whether peers are only reachable through the local broadcast
    local_only: AtomicBool,
}

struct PendingWrite {
    update: RoomUpdate,
    done: oneshot::Sender<()>,
}

impl RoomSession {
    pub(crate) async fn open(
        context: &CollabContext,
        room: Room,
        member: &str,
    ) -> RoomResult<Self> {
        if !room.is_member(member) {
            return Err(RoomError::NotAMember(member.to_string()));
        }

        let (writes, receiver) = mpsc::unbounded_channel();
        let (changes, _) = watch::channel(room.clone());

        let inner = Arc::new(SessionInner {
            room_id: room.id.clone(),
            member: member.to_string(),
            context: context.clone(),
            room: Mutex::new(room),
            pending: AtomicUsize::new(0),
            changes,
            writes,
            local_only: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let on_change: OnChange = Arc::new(move |room: Room| {
            if let Some(inner) = weak.upgrade() {
                inner.reconcile(room)
            }
        });

        let subscription = context
            .transports()
            .subscribe(&inner.room_id, on_change)
            .await?;

        inner
            .local_only
            .store(subscription.kind() == TransportKind::Local, Ordering::SeqCst);

        let writer = tokio::spawn(write_loop(Arc::downgrade(&inner), receiver));

        Ok(Self {
            inner,
            subscription,
            writer,
        })
    }

    /// The local copy of the room
    pub fn room(&self) -> Room {
        self.inner.room.lock().clone()
    }

    /// Receives the local copy every time it changes
    pub fn changes(&self) -> watch::Receiver<Room> {
        self.inner.changes.subscribe()
    }

    pub fn member(&self) -> &str {
        &self.inner.member
    }

    pub fn room_id(&self) -> &RoomId {
        &self.inner.room_id
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.subscription.kind()
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    pub fn role(&self) -> SyncRole {
        SyncCoordinator::new(&self.inner.room.lock()).role(&self.inner.member)
    }

    pub async fn add_item(&self, video: VideoRef) -> RoomResult<Room> {
        self.perform(|room, member, now| {
            let item = QueueItem::new(video, member, now);
            Ok(queuing::add_item(room, item, now))
        })
        .await
    }

    pub async fn vote(&self, key: &QueueItemKey, direction: VoteDirection) -> RoomResult<Room> {
        self.perform(|room, member, _| Ok(queuing::vote(room, key, member, direction)?))
            .await
    }

    pub async fn remove_item(&self, key: &QueueItemKey) -> RoomResult<Room> {
        self.perform(|room, member, _| {
            if !SyncCoordinator::new(room).can_control(member) {
                return Err(not_allowed(member, "remove queue items"));
            }

            Ok(queuing::remove_item(room, key)?)
        })
        .await
    }

    pub async fn play_pause(&self) -> RoomResult<Room> {
        self.perform(|room, member, now| Ok(SyncCoordinator::new(room).play_pause(member, now)?))
            .await
    }

    /// Commits a new shared position. Members without seek authority get [RoomError::NotAllowed],
    /// and should only move their local playback.
    pub async fn seek(&self, position: f64) -> RoomResult<Room> {
        self.perform(|room, member, now| {
            Ok(SyncCoordinator::new(room).seek(member, position, now)?)
        })
        .await
    }

    pub async fn next(&self) -> RoomResult<Room> {
        self.perform(|room, member, now| Ok(SyncCoordinator::new(room).next(member, now)?))
            .await
    }

    /// Opts this member in or out of sync play
    pub async fn toggle_sync(&self) -> RoomResult<Room> {
        self.perform(|room, member, now| Ok(SyncCoordinator::new(room).toggle(member, now)))
            .await
    }

    pub async fn toggle_room_sync(&self) -> RoomResult<Room> {
        self.perform(|room, member, now| {
            Ok(SyncCoordinator::new(room).toggle_room_sync(member, now)?)
        })
        .await
    }

    pub async fn rename(&self, name: &str) -> RoomResult<Room> {
        self.perform(|room, member, now| Ok(membership::rename(room, member, name, now)?))
            .await
    }

    pub async fn remove_member(&self, other: &str) -> RoomResult<Room> {
        self.perform(|room, member, now| {
            Ok(membership::remove_member(room, member, other, now)?)
        })
        .await
    }

    /// Writes the leader's playback position into the room.
    pub async fn report_position(&self, position: f64) -> RoomResult<Room> {
        self.perform(|room, member, now| {
            if SyncCoordinator::new(room).role(member) != SyncRole::Leader {
                return Err(not_allowed(member, "report the sync position"));
            }

            Ok(RoomUpdate {
                synced_time: Some(position.max(0.)),
                last_sync_update: Some(now),
                ..Default::default()
            })
        })
        .await
    }

    /// Leaves the room and closes the session.
    /// Returns [None] if the room was deleted as a result.
    pub async fn leave(self) -> RoomResult<Option<Room>> {
        self.subscription.unsubscribe();

        RoomManager::new(&self.inner.context)
            .leave_room(&self.inner.room_id, &self.inner.member)
            .await
    }

    /// Applies an action to the local copy, then waits for it to be persisted.
    ///
    /// Write failures are logged and leave the local copy as is.
    async fn perform<F>(&self, action: F) -> RoomResult<Room>
    where
        F: FnOnce(&Room, &str, Timestamp) -> RoomResult<RoomUpdate>,
    {
        let inner = &self.inner;
        let now = now_millis();
        let (done, resolved) = oneshot::channel();

        {
            let mut room = inner.room.lock();

            let update = action(&*room, &inner.member, now)?;
            let update = match update.last_activity {
                Some(_) => update,
                None => update.stamped(now),
            };

            room.apply(&update);
            inner.pending.fetch_add(1, Ordering::SeqCst);

            if inner.writes.send(PendingWrite { update, done }).is_err() {
                inner.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(RoomError::Internal("session writer stopped".to_string()));
            }

            inner.changes.send_replace(room.clone());
        }

        let _ = resolved.await;

        Ok(self.room())
    }
}

impl SessionInner {
    async fn persist(&self, update: RoomUpdate) {
        let result = self.context.store.update(&self.room_id, &update).await;

        let (snapshot, settled) = {
            let mut room = self.room.lock();
            let settled = self.pending.fetch_sub(1, Ordering::SeqCst) == 1;

            if let (Ok(stored), true) = (&result, settled) {
                if *room != *stored {
                    *room = stored.clone();
                    self.changes.send_replace(stored.clone());
                }
            }

            (room.clone(), settled)
        };

        match result {
            Ok(stored) => {
                let snapshot = if settled { stored } else { snapshot };
                self.context.cache.store(&snapshot);

                self.context.emit(CollabEvent::RoomUpdated {
                    room_id: self.room_id.clone(),
                    fields: update.fields(),
                });

                if self.local_only.load(Ordering::SeqCst) {
                    self.context.registry.publish(&snapshot).await;
                }
            }
            Err(e) => {
                warn!(
                    "Could not persist {:?} of room {}, keeping the local copy: {}",
                    update.fields(),
                    self.room_id,
                    e
                );

                self.context.cache.store(&snapshot);

                if e.is_unavailable() || self.local_only.load(Ordering::SeqCst) {
                    self.context.registry.publish(&snapshot).await;
                }
            }
        }
    }

    fn reconcile(&self, incoming: Room) {
        {
            let mut room = self.room.lock();

            // The snapshot predates our own writes, which will be reconciled when they resolve
            if self.pending.load(Ordering::SeqCst) > 0 {
                debug!("Deferring snapshot of room {}, writes in flight", self.room_id);
                return;
            }

            if *room == incoming {
                return;
            }

            *room = incoming.clone();
            self.changes.send_replace(incoming.clone());
        }

        self.context.cache.store(&incoming);
    }
}

async fn write_loop(inner: Weak<SessionInner>, mut writes: mpsc::UnboundedReceiver<PendingWrite>) {
    while let Some(write) = writes.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        inner.persist(write.update).await;
        let _ = write.done.send(());
    }
}

fn not_allowed(member: &str, action: &'static str) -> RoomError {
    ControlError::NotAllowed {
        member: member.to_string(),
        action,
    }
    .into()
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.writer.abort()
    }
}
