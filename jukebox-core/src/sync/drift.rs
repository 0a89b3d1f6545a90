use std::time::{Duration, Instant};

use crate::{Config, Room};

use super::{SyncCoordinator, SyncRole};

/// What the local player is doing right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlayback {
    /// The local position, in seconds.
    pub position: f64,
    pub is_playing: bool,
    /// The user is scrubbing or just seeked locally.
    pub interacting: bool,
}

/// An instruction for the local player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncAction {
    Seek(f64),
    Play,
    Pause,
}

/// Decides how a member's local player is aligned with the room.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    tolerance: f64,
}

impl DriftCorrector {
    pub fn new(config: &Config) -> Self {
        Self::with_tolerance(config.drift_tolerance_in_seconds)
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Returns the position to snap to, if the member is a follower that drifted too far.
    pub fn drift(&self, room: &Room, member: &str, local: &LocalPlayback) -> Option<f64> {
        if SyncCoordinator::new(room).role(member) != SyncRole::Follower {
            return None;
        }

        let has_reference = room.synced_time >= 0. && room.last_sync_update > 0;
        let drifted = (local.position - room.synced_time).abs() > self.tolerance;

        (has_reference && drifted && !local.interacting).then_some(room.synced_time)
    }

    /// All the actions a member's player should take, in order.
    ///
    /// Every member mirrors the room's playing state. Only followers snap to the leader.
    pub fn follow(&self, room: &Room, member: &str, local: &LocalPlayback) -> Vec<SyncAction> {
        if !room.is_member(member) {
            return vec![];
        }

        let mut actions = vec![];

        if let Some(position) = self.drift(room, member, local) {
            actions.push(SyncAction::Seek(position));
        }

        if room.is_playing && !local.is_playing {
            actions.push(SyncAction::Play);
        } else if !room.is_playing && (local.is_playing || !actions.is_empty()) {
            // A seek may resume some players, so pause again after it
            actions.push(SyncAction::Pause);
        }

        actions
    }
}

/// Whether the member should write its local position to the room.
/// Only the leader reports, and only while both the room and its player are playing.
pub fn should_report(room: &Room, member: &str, local: &LocalPlayback) -> bool {
    room.is_playing
        && local.is_playing
        && SyncCoordinator::new(room).role(member) == SyncRole::Leader
}

/// Limits how often the leader reports its position.
#[derive(Debug, Clone)]
pub struct ReportThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ReportThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and records the report if enough time has passed.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{should_report, DriftCorrector, LocalPlayback, ReportThrottle, SyncAction};
    use crate::{mock_room, sync::SyncCoordinator, Room};

    fn synced_room() -> Room {
        let mut room = mock_room();

        for member in ["u2", "u3"] {
            room.members.push(member.to_string());
            let update = SyncCoordinator::new(&room).enable(member, 10);
            room.apply(&update);
        }

        room.is_playing = true;
        room.synced_time = 10.5;
        room.last_sync_update = 10;
        room
    }

    fn local(position: f64) -> LocalPlayback {
        LocalPlayback {
            position,
            is_playing: true,
            interacting: false,
        }
    }

    #[test]
    fn follower_snaps_when_drifted() {
        let room = synced_room();
        let corrector = DriftCorrector::with_tolerance(0.35);

        // |10.0 - 10.5| = 0.5 > 0.35
        assert_eq!(corrector.drift(&room, "u3", &local(10.0)), Some(10.5));
        assert_eq!(corrector.drift(&room, "u3", &local(10.3)), None);
        assert_eq!(corrector.drift(&room, "u3", &local(10.85)), None);
        assert_eq!(corrector.drift(&room, "u3", &local(10.9)), Some(10.5));
    }

    #[test]
    fn only_followers_are_corrected() {
        let room = synced_room();
        let corrector = DriftCorrector::with_tolerance(0.35);

        // Leader, creator without sync, and an outsider
        assert_eq!(corrector.drift(&room, "u2", &local(0.)), None);
        assert_eq!(corrector.drift(&room, "u1", &local(0.)), None);
        assert_eq!(corrector.drift(&room, "u9", &local(0.)), None);
        assert!(corrector.follow(&room, "u2", &local(0.)).is_empty());
        assert!(corrector.follow(&room, "u1", &local(0.)).is_empty());
    }

    #[test]
    fn every_member_mirrors_pause() {
        let mut room = synced_room();
        room.is_playing = false;

        let corrector = DriftCorrector::with_tolerance(0.35);

        // Leader and creator are never snapped, but they still stop
        assert_eq!(corrector.follow(&room, "u2", &local(10.5)), vec![SyncAction::Pause]);
        assert_eq!(corrector.follow(&room, "u1", &local(3.)), vec![SyncAction::Pause]);
        assert!(corrector.follow(&room, "u9", &local(3.)).is_empty());

        room.is_playing = true;
        let paused = LocalPlayback {
            is_playing: false,
            ..local(3.)
        };
        assert_eq!(corrector.follow(&room, "u1", &paused), vec![SyncAction::Play]);
    }

    #[test]
    fn interacting_follower_is_left_alone() {
        let room = synced_room();
        let corrector = DriftCorrector::with_tolerance(0.35);

        let scrubbing = LocalPlayback {
            interacting: true,
            ..local(3.)
        };

        assert_eq!(corrector.drift(&room, "u3", &scrubbing), None);
    }

    #[test]
    fn no_reference_means_no_correction() {
        let mut room = synced_room();
        room.last_sync_update = 0;

        let corrector = DriftCorrector::with_tolerance(0.35);
        assert_eq!(corrector.drift(&room, "u3", &local(50.)), None);
    }

    #[test]
    fn follower_mirrors_playing_state() {
        let mut room = synced_room();
        let corrector = DriftCorrector::with_tolerance(0.35);

        let paused = LocalPlayback {
            is_playing: false,
            ..local(10.5)
        };
        assert_eq!(corrector.follow(&room, "u3", &paused), vec![SyncAction::Play]);

        room.is_playing = false;
        assert_eq!(corrector.follow(&room, "u3", &local(10.5)), vec![SyncAction::Pause]);
        assert!(corrector.follow(&room, "u3", &paused).is_empty());

        // Snapping while the room is paused keeps the player paused
        let drifted = LocalPlayback {
            is_playing: false,
            ..local(2.)
        };
        assert_eq!(
            corrector.follow(&room, "u3", &drifted),
            vec![SyncAction::Seek(10.5), SyncAction::Pause]
        );
    }

    #[test]
    fn only_playing_leader_reports() {
        let room = synced_room();

        assert!(should_report(&room, "u2", &local(4.)));
        assert!(!should_report(&room, "u3", &local(4.)));

        let paused = LocalPlayback {
            is_playing: false,
            ..local(4.)
        };
        assert!(!should_report(&room, "u2", &paused));

        // A player that has not caught up with a pause yet does not report
        let mut stopped = synced_room();
        stopped.is_playing = false;
        assert!(!should_report(&stopped, "u2", &local(4.)));
    }

    #[test]
    fn throttle_limits_reports() {
        let mut throttle = ReportThrottle::new(Duration::from_secs(2));
        let start = Instant::now();

        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_secs(1)));
        assert!(throttle.ready(start + Duration::from_secs(2)));
        assert!(!throttle.ready(start + Duration::from_millis(3500)));

        throttle.reset();
        assert!(throttle.ready(start + Duration::from_millis(3600)));
    }
}
