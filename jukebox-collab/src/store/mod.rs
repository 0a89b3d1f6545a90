use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures_util::{stream::BoxStream, Stream};
use jukebox_core::{MemberId, Room, RoomId, RoomUpdate, Timestamp};
use thiserror::Error;

mod http;
mod memory;
mod pg;

pub use http::*;
pub use memory::*;
pub use pg::*;

pub type Result<T> = std::result::Result<T, StoreError>;
pub type SharedStore = Arc<dyn RoomStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The room does not exist in the store
    #[error("Room {0} doesn't exist")]
    NotFound(RoomId),
    /// A room with the same id already exists
    #[error("Room with id {0} already exists")]
    Conflict(RoomId),
    /// The backend could not be reached
    #[error("Store is unavailable: {0}")]
    Unavailable(String),
    /// An unknown or internal error happened in the backend
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn not_found_or(self, id: &RoomId) -> StoreError;
    fn any(self) -> StoreError;
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A stream of full room snapshots, one per change.
pub struct RoomWatch {
    snapshots: BoxStream<'static, Room>,
}

impl RoomWatch {
    pub fn new(snapshots: BoxStream<'static, Room>) -> Self {
        Self { snapshots }
    }
}

impl Stream for RoomWatch {
    type Item = Room;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.snapshots.as_mut().poll_next(cx)
    }
}

/// Represents a backend that persists rooms.
///
/// Ids are normalized by [RoomId] before they reach the store.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// A short name used in logs
    fn name(&self) -> &'static str;

    async fn create(&self, room: Room) -> Result<Room>;
    async fn get(&self, id: &RoomId) -> Result<Room>;
    /// Merges the supplied fields into the stored room and stamps its activity.
    async fn update(&self, id: &RoomId, update: &RoomUpdate) -> Result<Room>;
    async fn delete(&self, id: &RoomId) -> Result<()>;

    async fn exists(&self, id: &RoomId) -> Result<bool> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Rooms containing the member, newest first
    async fn rooms_for_member(&self, member: &MemberId) -> Result<Vec<Room>>;

    /// Deletes every room inactive since before the cutoff, returning their ids.
    async fn delete_inactive(&self, cutoff: Timestamp) -> Result<Vec<RoomId>>;

    /// Subscribes to changes of a room. Returns [None] if the backend cannot push.
    /// Watching a missing room may fail with [StoreError::NotFound].
    async fn watch(&self, _id: &RoomId) -> Result<Option<RoomWatch>> {
        Ok(None)
    }
}
