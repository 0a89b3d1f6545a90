use indexmap::IndexMap;
use jukebox_core::{MemberId, Room, RoomId, Timestamp};
use serde::{Deserialize, Serialize};

use super::RoomError;

/// The payload shared with people invited to a room.
/// It carries enough to recreate the room if it expired in the meantime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    pub id: RoomId,
    pub name: String,
    pub creator: MemberId,
    pub created_at: Timestamp,
}

impl Invite {
    pub fn for_room(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            creator: room.creator.clone(),
            created_at: room.created_at,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RoomError> {
        serde_json::from_str(raw).map_err(|e| RoomError::InvalidJoinPayload(e.to_string()))
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Recreates the room with the joiner as its only member.
    pub fn into_room(self, joiner: &str, now: Timestamp) -> Room {
        let mut room = Room::new(self.id, self.name, self.creator, self.created_at);

        room.members = vec![joiner.to_string()];
        room.member_sync_states = IndexMap::from([(joiner.to_string(), false)]);
        room.last_sync_update = now;
        room.last_activity = now;

        room
    }
}

#[cfg(test)]
mod tests {
    use jukebox_core::{Room, RoomId};

    use super::Invite;
    use crate::RoomError;

    #[test]
    fn round_trips_through_payload() {
        let room = Room::new(RoomId::parse("AB12CD").unwrap(), "Party", "u1", 100);
        let invite = Invite::for_room(&room);

        assert_eq!(Invite::parse(&invite.encode()).unwrap(), invite);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(matches!(
            Invite::parse("{\"id\":\"AB12CD\"}"),
            Err(RoomError::InvalidJoinPayload(_))
        ));
        assert!(matches!(
            Invite::parse("{\"id\":\"nope\",\"name\":\"x\",\"creator\":\"u1\",\"created_at\":1}"),
            Err(RoomError::InvalidJoinPayload(_))
        ));
    }

    #[test]
    fn recreated_room_contains_only_joiner() {
        let invite = Invite {
            id: RoomId::parse("AB12CD").unwrap(),
            name: "Party".to_string(),
            creator: "u1".to_string(),
            created_at: 100,
        };

        let room = invite.into_room("u2", 500);

        assert_eq!(room.creator, "u1");
        assert_eq!(room.created_at, 100);
        assert_eq!(room.members, vec!["u2".to_string()]);
        assert_eq!(room.member_sync_states.get("u2"), Some(&false));
        assert_eq!(room.last_activity, 500);
    }
}
