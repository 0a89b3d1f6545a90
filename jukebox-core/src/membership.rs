//! Joining, leaving, and administering the members of a room.

use thiserror::Error;

use crate::{
    sync::{first_syncing, ControlError, SyncCoordinator},
    MemberId, Room, RoomUpdate, Timestamp,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("{0} is not a member of this room")]
    NotAMember(MemberId),
    #[error("Room name cannot be empty")]
    EmptyName,
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// What happens to a room when a member leaves it.
#[derive(Debug, Clone, PartialEq)]
pub enum Departure {
    /// The creator or the last member left.
    DeleteRoom,
    Update(RoomUpdate),
}

/// Adds a member with sync disabled. Returns [None] if the member already joined.
pub fn join(room: &Room, member: &str, now: Timestamp) -> Option<RoomUpdate> {
    if room.is_member(member) {
        return None;
    }

    let mut members = room.members.clone();
    members.push(member.to_string());

    let mut states = room.member_sync_states.clone();
    states.entry(member.to_string()).or_insert(false);

    Some(
        RoomUpdate {
            members: Some(members),
            member_sync_states: Some(states),
            ..Default::default()
        }
        .stamped(now),
    )
}

pub fn leave(room: &Room, member: &str, now: Timestamp) -> Result<Departure, MembershipError> {
    if !room.is_member(member) {
        return Err(MembershipError::NotAMember(member.to_string()));
    }

    if room.is_creator(member) || room.members.len() == 1 {
        return Ok(Departure::DeleteRoom);
    }

    Ok(Departure::Update(without(room, member, now)))
}

/// Removes another member. Only the creator may do this, and not to themselves.
pub fn remove_member(
    room: &Room,
    by: &str,
    member: &str,
    now: Timestamp,
) -> Result<RoomUpdate, MembershipError> {
    if !room.is_creator(by) || room.is_creator(member) {
        return Err(ControlError::NotAllowed {
            member: by.to_string(),
            action: "remove members",
        }
        .into());
    }

    if !room.is_member(member) {
        return Err(MembershipError::NotAMember(member.to_string()));
    }

    Ok(without(room, member, now))
}

pub fn rename(
    room: &Room,
    by: &str,
    name: &str,
    now: Timestamp,
) -> Result<RoomUpdate, MembershipError> {
    if !room.is_creator(by) {
        return Err(ControlError::NotAllowed {
            member: by.to_string(),
            action: "rename the room",
        }
        .into());
    }

    let name = name.trim();

    if name.is_empty() {
        return Err(MembershipError::EmptyName);
    }

    Ok(RoomUpdate {
        name: Some(name.to_string()),
        ..Default::default()
    }
    .stamped(now))
}

fn without(room: &Room, member: &str, now: Timestamp) -> RoomUpdate {
    let members = room
        .members
        .iter()
        .filter(|m| *m != member)
        .cloned()
        .collect();

    let mut states = room.member_sync_states.clone();
    states.shift_remove(member);

    let leader = match SyncCoordinator::new(room).leader() {
        Some(leader) if leader != member => Some(leader.to_string()),
        _ => first_syncing(&states),
    };

    let mut update = RoomUpdate {
        members: Some(members),
        member_sync_states: Some(states),
        ..Default::default()
    };

    if leader.as_deref() != room.sync_leader.as_deref() {
        update.sync_leader = Some(leader);
    }

    update.stamped(now)
}
