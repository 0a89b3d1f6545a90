mod invite;
mod session;

pub use invite::*;
pub use session::*;

use jukebox_core::{
    membership::{self, Departure, MembershipError},
    now_millis,
    queuing::QueueError,
    sync::ControlError,
    InvalidRoomId, MemberId, QueueItemKey, Room, RoomId, RoomUpdate,
};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{CollabContext, CollabEvent, StoreError, TransportError};

pub type RoomResult<T> = Result<T, RoomError>;

/// How many times a fresh id is generated when it collides with an existing room
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room {0} doesn't exist")]
    NotFound(RoomId),
    #[error("Room store is unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Room with id {0} already exists")]
    Conflict(RoomId),
    #[error("Invalid invite payload: {0}")]
    InvalidJoinPayload(String),
    #[error(transparent)]
    InvalidRoomId(#[from] InvalidRoomId),
    #[error(transparent)]
    NotAllowed(#[from] ControlError),
    #[error("Queue item {0} doesn't exist")]
    ItemNotFound(QueueItemKey),
    #[error("{0} is not a member of this room")]
    NotAMember(MemberId),
    #[error("Room name cannot be empty")]
    InvalidName,
    #[error("Unknown internal error: {0}")]
    Internal(String),
}

/// Creates, joins, and removes rooms in the store.
#[derive(Clone)]
pub struct RoomManager {
    context: CollabContext,
}

/// Deletes expired rooms periodically until dropped
pub struct Sweeper {
    task: JoinHandle<()>,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a room with the given id, or a freshly generated one.
    pub async fn create_room(
        &self,
        id: Option<RoomId>,
        name: &str,
        creator: &str,
    ) -> RoomResult<Room> {
        let name = name.trim();

        if name.is_empty() {
            return Err(RoomError::InvalidName);
        }

        let attempts = if id.is_some() { 1 } else { MAX_ID_ATTEMPTS };

        for _ in 0..attempts {
            let id = id.clone().unwrap_or_else(RoomId::generate);
            let room = Room::new(id, name, creator, now_millis());

            match self.context.store.create(room).await {
                Ok(room) => {
                    info!("Room {} ({}) created by {}", room.name, room.id, creator);

                    self.context.cache.store(&room);
                    self.context.emit(CollabEvent::RoomCreated {
                        room_id: room.id.clone(),
                        creator: creator.to_string(),
                    });

                    return Ok(room);
                }
                Err(StoreError::Conflict(id)) if attempts > 1 => {
                    debug!("Generated room id {} is taken, retrying", id)
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RoomError::Internal(
            "could not generate a unique room id".to_string(),
        ))
    }

    /// Adds a member to a room. If the room no longer exists, it is recreated from the invite.
    pub async fn join_room(
        &self,
        id: &RoomId,
        member: &str,
        display_name: &str,
        invite: Option<&str>,
    ) -> RoomResult<Room> {
        let room = match self.context.store.get(id).await {
            Ok(room) => room,
            Err(StoreError::NotFound(_)) => match invite {
                Some(raw) => self.restore(id, raw, member).await?,
                None => return Err(RoomError::NotFound(id.clone())),
            },
            Err(e) => return Err(e.into()),
        };

        let Some(update) = membership::join(&room, member, now_millis()) else {
            self.context.cache.store(&room);
            return Ok(room);
        };

        let room = self.context.store.update(id, &update).await?;

        info!("{} ({}) joined room {}", display_name, member, room.name);

        self.context.cache.store(&room);
        self.context.emit(CollabEvent::MemberJoined {
            room_id: id.clone(),
            member_id: member.to_string(),
            display_name: display_name.to_string(),
        });

        Ok(room)
    }

    async fn restore(&self, id: &RoomId, raw: &str, member: &str) -> RoomResult<Room> {
        let invite = Invite::parse(raw)?;

        if invite.id != *id {
            return Err(RoomError::InvalidJoinPayload(format!(
                "invite is for room {}, not {}",
                invite.id, id
            )));
        }

        let room = invite.into_room(member, now_millis());

        match self.context.store.create(room).await {
            Ok(room) => {
                info!("Room {} was recreated from an invite by {}", id, member);

                self.context.emit(CollabEvent::RoomRestored {
                    room_id: id.clone(),
                    member_id: member.to_string(),
                });

                Ok(room)
            }
            // Someone else restored it first
            Err(StoreError::Conflict(_)) => Ok(self.context.store.get(id).await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a room, falling back to the cached snapshot if the store is unreachable.
    pub async fn get_room(&self, id: &RoomId) -> RoomResult<Room> {
        match self.context.store.get(id).await {
            Ok(room) => {
                self.context.cache.store(&room);
                Ok(room)
            }
            Err(StoreError::Unavailable(reason)) => {
                warn!("Store unavailable, using cached room {}: {}", id, reason);

                self.context
                    .cache
                    .load(id)
                    .ok_or(RoomError::StoreUnavailable(reason))
            }
            Err(StoreError::NotFound(id)) => {
                self.context.cache.remove(&id);
                Err(RoomError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the supplied fields of a room.
    pub async fn update_room(&self, id: &RoomId, update: RoomUpdate) -> RoomResult<Room> {
        let update = match update.last_activity {
            Some(_) => update,
            None => update.stamped(now_millis()),
        };

        let room = self.context.store.update(id, &update).await?;

        self.context.cache.store(&room);
        self.context.emit(CollabEvent::RoomUpdated {
            room_id: id.clone(),
            fields: update.fields(),
        });

        Ok(room)
    }

    /// Removes a member from a room. Returns [None] if the room was deleted as a result.
    pub async fn leave_room(&self, id: &RoomId, member: &str) -> RoomResult<Option<Room>> {
        let room = self.context.store.get(id).await?;
        let departure = membership::leave(&room, member, now_millis())?;

        let room = match departure {
            Departure::DeleteRoom => {
                self.delete_room(id).await?;
                None
            }
            Departure::Update(update) => Some(self.update_room(id, update).await?),
        };

        info!("{} left room {}", member, id);

        self.context.emit(CollabEvent::MemberLeft {
            room_id: id.clone(),
            member_id: member.to_string(),
        });

        Ok(room)
    }

    pub async fn delete_room(&self, id: &RoomId) -> RoomResult<()> {
        self.context.store.delete(id).await?;
        self.context.cache.remove(id);

        info!("Room {} deleted", id);
        self.context.emit(CollabEvent::RoomDeleted {
            room_id: id.clone(),
        });

        Ok(())
    }

    /// Rooms the member belongs to. If the store is unreachable, the cached rooms are
    /// listed instead, newest first.
    pub async fn rooms_for_member(&self, member: &MemberId) -> RoomResult<Vec<Room>> {
        match self.context.store.rooms_for_member(member).await {
            Ok(rooms) => Ok(rooms),
            Err(StoreError::Unavailable(reason)) => {
                warn!("Store unavailable, listing cached rooms of {}: {}", member, reason);

                let mut rooms: Vec<Room> = self
                    .context
                    .cache
                    .all()
                    .into_iter()
                    .filter(|room| room.is_member(member))
                    .collect();

                rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(rooms)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every room that has been inactive for longer than the retention window.
    pub async fn sweep_expired(&self) -> RoomResult<Vec<RoomId>> {
        let cutoff = now_millis() - self.context.config.retention_in_millis();
        let deleted = self.context.store.delete_inactive(cutoff).await?;

        for id in &deleted {
            self.context.cache.remove(id);
            self.context.emit(CollabEvent::RoomDeleted {
                room_id: id.clone(),
            });
        }

        if !deleted.is_empty() {
            info!("Swept {} expired room(s)", deleted.len());
        }

        Ok(deleted)
    }

    /// Sweeps expired rooms on the configured interval.
    pub fn spawn_sweeper(&self) -> Sweeper {
        let manager = self.clone();
        let period = self.context.config.sweep_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);

            loop {
                ticker.tick().await;

                if let Err(e) = manager.sweep_expired().await {
                    warn!("Could not sweep expired rooms: {}", e);
                }
            }
        });

        Sweeper { task }
    }

    /// Opens a live, reconciled view of a room for one of its members.
    pub async fn open_session(&self, id: &RoomId, member: &str) -> RoomResult<RoomSession> {
        let room = self.get_room(id).await?;
        RoomSession::open(&self.context, room, member).await
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort()
    }
}

impl From<StoreError> for RoomError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict(id) => Self::Conflict(id),
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<TransportError> for RoomError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Store(e) => e.into(),
            e => Self::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<QueueError> for RoomError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::ItemNotFound(key) => Self::ItemNotFound(key),
        }
    }
}

impl From<MembershipError> for RoomError {
    fn from(value: MembershipError) -> Self {
        match value {
            MembershipError::NotAMember(member) => Self::NotAMember(member),
            MembershipError::EmptyName => Self::InvalidName,
            MembershipError::Control(e) => Self::NotAllowed(e),
        }
    }
}
