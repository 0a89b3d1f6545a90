use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use jukebox_core::{now_millis, MemberId, Room, RoomId, RoomUpdate, Timestamp};
use tokio::sync::broadcast::{self, error::RecvError};

use super::{Result, RoomStore, RoomWatch, StoreError};

/// An in-process store. Every change is pushed to watchers as a full snapshot.
pub struct MemoryStore {
    rooms: DashMap<RoomId, Room>,
    channels: DashMap<RoomId, broadcast::Sender<Room>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Default::default(),
            channels: Default::default(),
            capacity: capacity.max(1),
        }
    }

    fn publish(&self, room: &Room) {
        if let Some(sender) = self.channels.get(&room.id) {
            // No receivers is fine
            let _ = sender.send(room.clone());
        }
    }

    /// Only rooms that exist get a channel. Holding the room entry keeps a
    /// concurrent delete from running until the channel is in place.
    fn sender(&self, id: &RoomId) -> Result<broadcast::Sender<Room>> {
        let _room = self
            .rooms
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let sender = self
            .channels
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();

        Ok(sender)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, room: Room) -> Result<Room> {
        match self.rooms.entry(room.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict(room.id)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(room.clone());
                self.publish(&room);

                Ok(room)
            }
        }
    }

    async fn get(&self, id: &RoomId) -> Result<Room> {
        self.rooms
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &RoomId, update: &RoomUpdate) -> Result<Room> {
        let room = {
            let mut room = self
                .rooms
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;

            room.apply(update);
            room.last_activity = update.last_activity.unwrap_or_else(now_millis);
            room.clone()
        };

        self.publish(&room);
        Ok(room)
    }

    async fn delete(&self, id: &RoomId) -> Result<()> {
        self.rooms
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        // Dropping the sender ends every watch on the room
        self.channels.remove(id);
        Ok(())
    }

    async fn rooms_for_member(&self, member: &MemberId) -> Result<Vec<Room>> {
        let mut rooms: Vec<_> = self
            .rooms
            .iter()
            .filter(|r| r.is_member(member))
            .map(|r| r.clone())
            .collect();

        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn delete_inactive(&self, cutoff: Timestamp) -> Result<Vec<RoomId>> {
        let expired: Vec<_> = self
            .rooms
            .iter()
            .filter(|r| r.is_expired(cutoff))
            .map(|r| r.id.clone())
            .collect();

        for id in &expired {
            self.rooms.remove(id);
            self.channels.remove(id);
        }

        Ok(expired)
    }

    async fn watch(&self, id: &RoomId) -> Result<Option<RoomWatch>> {
        let receiver = self.sender(id)?.subscribe();

        let snapshots = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(room) => return Some((room, receiver)),
                    // A slow watcher only needs the latest snapshot
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(Some(RoomWatch::new(snapshots.boxed())))
    }
}
