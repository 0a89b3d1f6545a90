//! Store doubles and contexts shared by the tests of this crate.

use std::sync::Arc;

use async_trait::async_trait;
use jukebox_core::{Config, MemberId, Room, RoomId, RoomUpdate, Timestamp};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::{
    store::Result, BroadcastRegistry, CollabContext, LocalCache, MemoryStore, RoomStore,
    RoomWatch, SharedStore, StoreError,
};

/// A context backed by a memory store, with its cache in a temporary directory.
pub fn mock_context() -> (CollabContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let context = context_with(Arc::new(MemoryStore::default()), &dir);
    (context, dir)
}

pub fn context_with(store: SharedStore, dir: &TempDir) -> CollabContext {
    let cache = LocalCache::new(dir.path().join("cache")).unwrap();

    CollabContext::new(store, cache, BroadcastRegistry::new(), Config::default())
}

/// The same context, but every store call fails as if the backend was unreachable.
pub fn offline_context(context: &CollabContext) -> CollabContext {
    CollabContext {
        store: Arc::new(FailingStore),
        ..context.clone()
    }
}

pub struct FailingStore;

fn offline<T>() -> Result<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl RoomStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn create(&self, _room: Room) -> Result<Room> {
        offline()
    }

    async fn get(&self, _id: &RoomId) -> Result<Room> {
        offline()
    }

    async fn update(&self, _id: &RoomId, _update: &RoomUpdate) -> Result<Room> {
        offline()
    }

    async fn delete(&self, _id: &RoomId) -> Result<()> {
        offline()
    }

    async fn rooms_for_member(&self, _member: &MemberId) -> Result<Vec<Room>> {
        offline()
    }

    async fn delete_inactive(&self, _cutoff: Timestamp) -> Result<Vec<RoomId>> {
        offline()
    }
}

/// A memory store whose updates wait until they are let through.
pub struct GatedStore {
    pub inner: MemoryStore,
    gate: Semaphore,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::default(),
            gate: Semaphore::new(0),
        }
    }

    /// Lets the given number of pending or future updates through
    pub fn release(&self, updates: usize) {
        self.gate.add_permits(updates)
    }
}

#[async_trait]
impl RoomStore for GatedStore {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn create(&self, room: Room) -> Result<Room> {
        self.inner.create(room).await
    }

    async fn get(&self, id: &RoomId) -> Result<Room> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &RoomId, update: &RoomUpdate) -> Result<Room> {
        self.gate
            .acquire()
            .await
            .map_err(|e| StoreError::Internal(e.into()))?
            .forget();

        self.inner.update(id, update).await
    }

    async fn delete(&self, id: &RoomId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn rooms_for_member(&self, member: &MemberId) -> Result<Vec<Room>> {
        self.inner.rooms_for_member(member).await
    }

    async fn delete_inactive(&self, cutoff: Timestamp) -> Result<Vec<RoomId>> {
        self.inner.delete_inactive(cutoff).await
    }

    async fn watch(&self, id: &RoomId) -> Result<Option<RoomWatch>> {
        self.inner.watch(id).await
    }
}
