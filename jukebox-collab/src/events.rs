use crossbeam::channel::{Receiver, Sender};
use jukebox_core::{MemberId, RoomId};

use crate::TransportKind;

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system
#[derive(Debug, Clone, PartialEq)]
pub enum CollabEvent {
    /// A room was created
    RoomCreated { room_id: RoomId, creator: MemberId },
    /// A room was recreated from an invite after it was not found
    RoomRestored { room_id: RoomId, member_id: MemberId },
    /// Some fields of a room were persisted
    RoomUpdated {
        room_id: RoomId,
        fields: Vec<&'static str>,
    },
    /// A room was deleted, either explicitly or because it expired
    RoomDeleted { room_id: RoomId },
    /// A member joined a room
    MemberJoined {
        room_id: RoomId,
        member_id: MemberId,
        display_name: String,
    },
    /// A member left or was removed from a room
    MemberLeft { room_id: RoomId, member_id: MemberId },
    /// A subscription to a room was established
    Subscribed { room_id: RoomId, kind: TransportKind },
}
