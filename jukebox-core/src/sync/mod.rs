//! Sync play: leader election, control authority and drift correction.

mod drift;

pub use drift::*;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{queuing, MemberId, Room, RoomUpdate, Timestamp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("{member} is not allowed to {action}")]
    NotAllowed {
        member: MemberId,
        action: &'static str,
    },
}

/// How a member relates to synchronized playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    /// The member's position is authoritative for followers.
    Leader,
    /// The member follows the leader's position and playing state.
    Follower,
    /// The member plays independently.
    Unsynced,
}

/// Answers authority questions and produces sync transitions for a room.
pub struct SyncCoordinator<'a> {
    room: &'a Room,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(room: &'a Room) -> Self {
        Self { room }
    }

    /// The leader, if it is consistent with the sync states.
    pub fn leader(&self) -> Option<&'a str> {
        self.room
            .sync_leader
            .as_deref()
            .filter(|leader| self.room.is_syncing(leader))
    }

    pub fn role(&self, member: &str) -> SyncRole {
        if !self.room.is_syncing(member) {
            SyncRole::Unsynced
        } else if self.leader() == Some(member) {
            SyncRole::Leader
        } else {
            SyncRole::Follower
        }
    }

    /// Play, pause and next are allowed for the creator and for syncing members.
    pub fn can_control(&self, member: &str) -> bool {
        self.room.is_creator(member) || self.room.is_syncing(member)
    }

    /// Seeking the shared position is allowed for the creator and the leader only.
    pub fn can_seek(&self, member: &str) -> bool {
        self.room.is_creator(member) || self.leader() == Some(member)
    }

    /// Opts a member into sync play. The first syncing member becomes the leader.
    pub fn enable(&self, member: &str, now: Timestamp) -> RoomUpdate {
        self.transition(member, true, now)
    }

    /// Opts a member out of sync play, handing leadership over if needed.
    pub fn disable(&self, member: &str, now: Timestamp) -> RoomUpdate {
        self.transition(member, false, now)
    }

    pub fn toggle(&self, member: &str, now: Timestamp) -> RoomUpdate {
        self.transition(member, !self.room.is_syncing(member), now)
    }

    /// Toggles the shared playing state.
    /// A syncing member that starts playback claims leadership.
    pub fn play_pause(&self, member: &str, now: Timestamp) -> Result<RoomUpdate, ControlError> {
        self.ensure(self.can_control(member), member, "play or pause")?;

        let is_playing = !self.room.is_playing;

        let mut update = RoomUpdate {
            is_playing: Some(is_playing),
            last_sync_update: Some(now),
            ..Default::default()
        };

        if is_playing && self.room.is_syncing(member) {
            update.sync_leader = Some(Some(member.to_string()));
        }

        Ok(update)
    }

    /// Commits a new shared position.
    pub fn seek(
        &self,
        member: &str,
        position: f64,
        now: Timestamp,
    ) -> Result<RoomUpdate, ControlError> {
        self.ensure(self.can_seek(member), member, "seek")?;

        Ok(RoomUpdate {
            synced_time: Some(position.max(0.)),
            last_sync_update: Some(now),
            ..Default::default()
        })
    }

    /// Skips to the next item in the queue.
    pub fn next(&self, member: &str, now: Timestamp) -> Result<RoomUpdate, ControlError> {
        self.ensure(self.can_control(member), member, "skip")?;

        Ok(queuing::advance(self.room, now))
    }

    /// Toggles the room wide sync play flag. Only the creator may do this.
    pub fn toggle_room_sync(&self, member: &str, now: Timestamp) -> Result<RoomUpdate, ControlError> {
        self.ensure(self.room.is_creator(member), member, "toggle room sync")?;

        Ok(RoomUpdate {
            sync_play: Some(!self.room.sync_play),
            last_sync_update: Some(now),
            ..Default::default()
        })
    }

    fn transition(&self, member: &str, enabled: bool, now: Timestamp) -> RoomUpdate {
        let mut states = self.room.member_sync_states.clone();
        states.insert(member.to_string(), enabled);

        let leader = match self.leader() {
            Some(leader) if leader != member => Some(leader.to_string()),
            _ if enabled => Some(member.to_string()),
            _ => first_syncing(&states),
        };

        let mut update = RoomUpdate {
            member_sync_states: Some(states),
            last_sync_update: Some(now),
            ..Default::default()
        };

        if leader.as_deref() != self.room.sync_leader.as_deref() {
            update.sync_leader = Some(leader);
        }

        update
    }

    fn ensure(&self, allowed: bool, member: &str, action: &'static str) -> Result<(), ControlError> {
        if allowed {
            Ok(())
        } else {
            Err(ControlError::NotAllowed {
                member: member.to_string(),
                action,
            })
        }
    }
}

/// The first member in iteration order that has sync enabled.
pub fn first_syncing(states: &IndexMap<MemberId, bool>) -> Option<MemberId> {
    states
        .iter()
        .find_map(|(member, enabled)| enabled.then(|| member.clone()))
}

/// Whether the leader invariant holds for a room.
pub fn leader_is_consistent(room: &Room) -> bool {
    match &room.sync_leader {
        Some(leader) => room.is_syncing(leader),
        None => !room.member_sync_states.values().any(|enabled| *enabled),
    }
}
