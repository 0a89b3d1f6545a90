//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from the collab types.
//!
//! They serialize exactly like the records they mirror, so clients can read them as rooms.

use indexmap::IndexMap;
use jukebox_core::{QueueItem as CoreQueueItem, Room as CoreRoom, VideoRef};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Room {
    id: String,
    name: String,
    creator: String,
    created_at: i64,
    queue: Vec<QueueItem>,
    members: Vec<String>,
    sync_play: bool,
    /// The leader's last reported position, in seconds.
    synced_time: f64,
    last_sync_update: i64,
    current_song: Option<QueueItem>,
    is_playing: bool,
    /// In the order members joined
    #[schema(value_type = HashMap<String, bool>)]
    member_sync_states: IndexMap<String, bool>,
    sync_leader: Option<String>,
    last_activity: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueItem {
    video: Video,
    added_by: String,
    added_at: i64,
    upvoters: Vec<String>,
    downvoters: Vec<String>,
    votes: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Video {
    id: String,
    title: String,
    channel_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomEnvelope {
    pub room: Room,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl ToSerialized<Room> for CoreRoom {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id.to_string(),
            name: self.name.clone(),
            creator: self.creator.clone(),
            created_at: self.created_at,
            queue: self.queue.to_serialized(),
            members: self.members.clone(),
            sync_play: self.sync_play,
            synced_time: self.synced_time,
            last_sync_update: self.last_sync_update,
            current_song: self.current_song.to_serialized(),
            is_playing: self.is_playing,
            member_sync_states: self.member_sync_states.clone(),
            sync_leader: self.sync_leader.clone(),
            last_activity: self.last_activity,
        }
    }
}

impl ToSerialized<QueueItem> for CoreQueueItem {
    fn to_serialized(&self) -> QueueItem {
        QueueItem {
            video: self.video.to_serialized(),
            added_by: self.added_by.clone(),
            added_at: self.added_at,
            upvoters: self.upvoters.clone(),
            downvoters: self.downvoters.clone(),
            votes: self.votes,
        }
    }
}

impl ToSerialized<Video> for VideoRef {
    fn to_serialized(&self) -> Video {
        Video {
            id: self.id.clone(),
            title: self.title.clone(),
            channel_title: self.channel_title.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
        }
    }
}

impl<T, U> ToSerialized<Vec<U>> for Vec<T>
where
    T: ToSerialized<U>,
    U: Serialize,
{
    fn to_serialized(&self) -> Vec<U> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<T, U> ToSerialized<Option<U>> for Option<T>
where
    T: ToSerialized<U>,
    U: Serialize,
{
    fn to_serialized(&self) -> Option<U> {
        self.as_ref().map(|x| x.to_serialized())
    }
}

#[cfg(test)]
mod tests {
    use jukebox_core::{QueueItem, Room, RoomId, VideoRef};

    use super::{Room as SerializedRoom, ToSerialized};

    #[test]
    fn serializes_like_the_record() {
        let mut room = Room::new(RoomId::parse("ab12cd").unwrap(), "Party", "u1", 100);

        let video = VideoRef {
            id: "dQw4w9WgXcQ".to_string(),
            title: "Song".to_string(),
            channel_title: "Artist".to_string(),
            thumbnail_url: None,
        };

        room.current_song = Some(QueueItem::new(video.clone(), "u1", 200));
        room.queue.push(QueueItem::new(video, "u2", 300));
        room.member_sync_states.insert("u2".to_string(), true);
        room.member_sync_states.insert("u1".to_string(), false);
        room.sync_leader = Some("u2".to_string());

        let serialized: SerializedRoom = room.to_serialized();
        let json = serde_json::to_string(&serialized).unwrap();

        assert_eq!(json, serde_json::to_string(&room).unwrap());
        assert_eq!(serde_json::from_str::<Room>(&json).unwrap(), room);
    }
}
