use async_trait::async_trait;
use futures_util::{future, StreamExt};
use indexmap::IndexMap;
use jukebox_core::{now_millis, MemberId, QueueItem, Room, RoomId, RoomUpdate, Timestamp};
use log::{info, warn};
use sqlx::{
    postgres::{PgListener, PgPoolOptions},
    query, query_as, query_scalar,
    types::Json,
    Error as SqlxError, FromRow, PgPool, Postgres, QueryBuilder,
};

use super::{IntoStoreError, Result, RoomStore, RoomWatch, StoreError};

/// A postgres store for rooms. Changes are pushed with LISTEN/NOTIFY.
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct RoomRow {
    id: String,
    name: String,
    creator: String,
    created_at: i64,
    queue: Json<Vec<QueueItem>>,
    members: Json<Vec<MemberId>>,
    sync_play: bool,
    synced_time: f64,
    last_sync_update: i64,
    current_song: Option<Json<QueueItem>>,
    is_playing: bool,
    member_sync_states: Json<IndexMap<MemberId, bool>>,
    sync_leader: Option<String>,
    last_activity: i64,
}

impl PgStore {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Internal(Box::new(e)))?;

        info!("Connected to postgres and ran migrations");

        Ok(Self { pool })
    }
}

async fn fetch(pool: &PgPool, id: &RoomId) -> Result<Room> {
    query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1")
        .bind(id.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| e.not_found_or(id))?
        .try_into()
}

/// What a notification turns into: skipped, a snapshot, or `Some(None)` once the room is gone.
fn snapshot(fetched: Result<Room>, id: &RoomId) -> Option<Option<Room>> {
    match fetched {
        Ok(room) => Some(Some(room)),
        Err(StoreError::NotFound(_)) => Some(None),
        Err(e) => {
            warn!("Could not fetch notified room {}: {}", id, e);
            None
        }
    }
}

fn created(row: Option<RoomRow>, id: &RoomId) -> Result<Room> {
    row.ok_or_else(|| StoreError::Conflict(id.clone()))?
        .try_into()
}

// Binding through text keeps the key order, which jsonb would not
fn sync_states_json(states: &IndexMap<MemberId, bool>) -> Result<String> {
    serde_json::to_string(states).map_err(|e| StoreError::Internal(Box::new(e)))
}

#[async_trait]
impl RoomStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, room: Room) -> Result<Room> {
        // Concurrent creators race on the primary key, the loser gets no row back
        let row = query_as::<_, RoomRow>(
            "INSERT INTO rooms (
                id, name, creator, created_at, queue, members, sync_play, synced_time,
                last_sync_update, current_song, is_playing, member_sync_states, sync_leader, last_activity
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::json, $13, $14)
            ON CONFLICT (id) DO NOTHING
            RETURNING *",
        )
        .bind(room.id.as_str())
        .bind(&room.name)
        .bind(&room.creator)
        .bind(room.created_at)
        .bind(Json(&room.queue))
        .bind(Json(&room.members))
        .bind(room.sync_play)
        .bind(room.synced_time)
        .bind(room.last_sync_update)
        .bind(room.current_song.as_ref().map(Json))
        .bind(room.is_playing)
        .bind(sync_states_json(&room.member_sync_states)?)
        .bind(&room.sync_leader)
        .bind(room.last_activity)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        created(row, &room.id)
    }

    async fn get(&self, id: &RoomId) -> Result<Room> {
        fetch(&self.pool, id).await
    }

    async fn update(&self, id: &RoomId, update: &RoomUpdate) -> Result<Room> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE rooms SET last_activity = ");
        builder.push_bind(update.last_activity.unwrap_or_else(now_millis));

        if let Some(name) = &update.name {
            builder.push(", name = ").push_bind(name.clone());
        }
        if let Some(queue) = &update.queue {
            builder.push(", queue = ").push_bind(Json(queue.clone()));
        }
        if let Some(members) = &update.members {
            builder.push(", members = ").push_bind(Json(members.clone()));
        }
        if let Some(sync_play) = update.sync_play {
            builder.push(", sync_play = ").push_bind(sync_play);
        }
        if let Some(synced_time) = update.synced_time {
            builder.push(", synced_time = ").push_bind(synced_time);
        }
        if let Some(last_sync_update) = update.last_sync_update {
            builder
                .push(", last_sync_update = ")
                .push_bind(last_sync_update);
        }
        if let Some(current_song) = &update.current_song {
            builder
                .push(", current_song = ")
                .push_bind(current_song.clone().map(Json));
        }
        if let Some(is_playing) = update.is_playing {
            builder.push(", is_playing = ").push_bind(is_playing);
        }
        if let Some(states) = &update.member_sync_states {
            builder
                .push(", member_sync_states = ")
                .push_bind(sync_states_json(states)?)
                .push("::json");
        }
        if let Some(leader) = &update.sync_leader {
            builder.push(", sync_leader = ").push_bind(leader.clone());
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id.as_str().to_string())
            .push(" RETURNING *");

        builder
            .build_query_as::<RoomRow>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or(id))?
            .try_into()
    }

    async fn delete(&self, id: &RoomId) -> Result<()> {
        let result = query("DELETE FROM rooms WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        Ok(())
    }

    async fn rooms_for_member(&self, member: &MemberId) -> Result<Vec<Room>> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE members ? $1 ORDER BY created_at DESC")
            .bind(member)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(Room::try_from)
            .collect()
    }

    async fn delete_inactive(&self, cutoff: Timestamp) -> Result<Vec<RoomId>> {
        let ids: Vec<String> =
            query_scalar("DELETE FROM rooms WHERE last_activity < $1 RETURNING id")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| e.any())?;

        Ok(ids
            .into_iter()
            .filter_map(|id| RoomId::parse(&id).ok())
            .collect())
    }

    async fn watch(&self, id: &RoomId) -> Result<Option<RoomWatch>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| e.any())?;

        listener
            .listen(&format!("room_{id}"))
            .await
            .map_err(|e| e.any())?;

        let pool = self.pool.clone();

        // The payload only carries the id, since rows can exceed the notify limit
        let snapshots = listener
            .into_stream()
            .filter_map(move |notification| {
                let pool = pool.clone();

                async move {
                    let notification = notification
                        .map_err(|e| warn!("Room notification failed: {}", e))
                        .ok()?;

                    let id = RoomId::parse(notification.payload()).ok()?;
                    snapshot(fetch(&pool, &id).await, &id)
                }
            })
            .take_while(|room| future::ready(room.is_some()))
            .filter_map(future::ready);

        Ok(Some(RoomWatch::new(snapshots.boxed())))
    }
}

impl TryFrom<RoomRow> for Room {
    type Error = StoreError;

    fn try_from(row: RoomRow) -> Result<Self> {
        let id = RoomId::parse(&row.id).map_err(|e| StoreError::Internal(Box::new(e)))?;

        Ok(Room {
            id,
            name: row.name,
            creator: row.creator,
            created_at: row.created_at,
            queue: row.queue.0,
            members: row.members.0,
            sync_play: row.sync_play,
            synced_time: row.synced_time,
            last_sync_update: row.last_sync_update,
            current_song: row.current_song.map(|s| s.0),
            is_playing: row.is_playing,
            member_sync_states: row.member_sync_states.0,
            sync_leader: row.sync_leader,
            last_activity: row.last_activity,
        })
    }
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        match self {
            SqlxError::Io(_)
            | SqlxError::Tls(_)
            | SqlxError::PoolTimedOut
            | SqlxError::PoolClosed
            | SqlxError::WorkerCrashed => StoreError::Unavailable(self.to_string()),
            e => StoreError::Internal(Box::new(e)),
        }
    }

    fn not_found_or(self, id: &RoomId) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound(id.clone()),
            e => Self::any(e),
        }
    }
}
