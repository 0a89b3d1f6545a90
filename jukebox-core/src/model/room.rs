use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{QueueItem, RoomId, RoomUpdate, Timestamp};

/// Members are identified by a client generated id.
pub type MemberId = String;

/// The shared state of a room, as persisted and as observed by every client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub creator: MemberId,
    pub created_at: Timestamp,
    #[serde(default)]
    pub queue: Vec<QueueItem>,
    #[serde(default)]
    pub members: Vec<MemberId>,
    /// Room wide flag toggled by the creator. Carries no authority on its own.
    #[serde(default)]
    pub sync_play: bool,
    /// The leader's last reported position, in seconds.
    #[serde(default)]
    pub synced_time: f64,
    #[serde(default)]
    pub last_sync_update: Timestamp,
    #[serde(default)]
    pub current_song: Option<QueueItem>,
    #[serde(default)]
    pub is_playing: bool,
    /// Iteration order is insertion order, which decides leadership transfers.
    #[serde(default)]
    pub member_sync_states: IndexMap<MemberId, bool>,
    #[serde(default)]
    pub sync_leader: Option<MemberId>,
    #[serde(default)]
    pub last_activity: Timestamp,
}

impl Room {
    /// Creates a room with the creator as its only member.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        creator: impl Into<MemberId>,
        now: Timestamp,
    ) -> Self {
        let creator = creator.into();

        Self {
            id,
            name: name.into(),
            members: vec![creator.clone()],
            creator,
            created_at: now,
            queue: vec![],
            sync_play: false,
            synced_time: 0.,
            last_sync_update: now,
            current_song: None,
            is_playing: false,
            member_sync_states: IndexMap::new(),
            sync_leader: None,
            last_activity: now,
        }
    }

    /// Merges the supplied fields of an update into this room.
    pub fn apply(&mut self, update: &RoomUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(queue) = &update.queue {
            self.queue = queue.clone();
        }
        if let Some(members) = &update.members {
            self.members = members.clone();
        }
        if let Some(sync_play) = update.sync_play {
            self.sync_play = sync_play;
        }
        if let Some(synced_time) = update.synced_time {
            self.synced_time = synced_time;
        }
        if let Some(last_sync_update) = update.last_sync_update {
            self.last_sync_update = last_sync_update;
        }
        if let Some(current_song) = &update.current_song {
            self.current_song = current_song.clone();
        }
        if let Some(is_playing) = update.is_playing {
            self.is_playing = is_playing;
        }
        if let Some(states) = &update.member_sync_states {
            self.member_sync_states = states.clone();
        }
        if let Some(leader) = &update.sync_leader {
            self.sync_leader = leader.clone();
        }
        if let Some(last_activity) = update.last_activity {
            self.last_activity = last_activity;
        }
    }

    /// Returns a copy with the update applied.
    pub fn with(&self, update: &RoomUpdate) -> Self {
        let mut room = self.clone();
        room.apply(update);
        room
    }

    pub fn is_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    pub fn is_creator(&self, member: &str) -> bool {
        self.creator == member
    }

    /// Whether the member has opted into synchronized playback.
    pub fn is_syncing(&self, member: &str) -> bool {
        self.member_sync_states.get(member).copied().unwrap_or(false)
    }

    /// Whether the room has been inactive since before the cutoff.
    pub fn is_expired(&self, cutoff: Timestamp) -> bool {
        self.last_activity < cutoff
    }
}

#[cfg(test)]
pub(crate) fn mock_room() -> Room {
    Room::new(RoomId::parse("AB12CD").unwrap(), "Test room", "u1", 1_000)
}

#[cfg(test)]
mod tests {
    use super::mock_room;
    use crate::RoomUpdate;

    #[test]
    fn new_room_contains_creator() {
        let room = mock_room();

        assert_eq!(room.members, vec!["u1".to_string()]);
        assert!(room.is_creator("u1"));
        assert!(room.member_sync_states.is_empty());
        assert!(room.sync_leader.is_none());
        assert!(room.current_song.is_none());
    }

    #[test]
    fn partial_update_touches_only_supplied_fields() {
        let mut room = mock_room();
        room.is_playing = true;
        room.synced_time = 42.5;
        room.member_sync_states.insert("u1".to_string(), true);
        room.sync_leader = Some("u1".to_string());

        let before = serde_json::to_value(&room).unwrap();

        let update = RoomUpdate {
            is_playing: Some(false),
            ..Default::default()
        };
        room.apply(&update);

        let mut after = serde_json::to_value(&room).unwrap();
        assert_eq!(after["is_playing"], false);

        after["is_playing"] = true.into();
        assert_eq!(before, after);
    }

    #[test]
    fn explicit_null_clears_nullable_fields() {
        let mut room = mock_room();
        room.sync_leader = Some("u1".to_string());

        let update: RoomUpdate = serde_json::from_str(r#"{"sync_leader":null}"#).unwrap();
        room.apply(&update);
        assert!(room.sync_leader.is_none());

        room.sync_leader = Some("u1".to_string());
        let update: RoomUpdate = serde_json::from_str(r#"{"name":"Renamed"}"#).unwrap();
        room.apply(&update);
        assert_eq!(room.sync_leader.as_deref(), Some("u1"));
        assert_eq!(room.name, "Renamed");
    }

    #[test]
    fn record_round_trips() {
        let room = mock_room();
        let json = serde_json::to_string(&room).unwrap();
        let parsed: super::Room = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, room);
    }
}
