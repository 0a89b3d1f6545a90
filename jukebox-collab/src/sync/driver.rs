use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam::atomic::AtomicCell;
use jukebox_core::{
    sync::{should_report, DriftCorrector, LocalPlayback, ReportThrottle, SyncAction, SyncCoordinator},
    Config, Room,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::PlaybackEngine;
use crate::{RoomResult, RoomSession};

/// Keeps a local player in line with a room.
///
/// The leader reports its position, followers snap to it when they drift,
/// and whoever holds control advances the queue when a track ends.
pub struct PlaybackSync {
    session: Arc<RoomSession>,
    engine: Arc<dyn PlaybackEngine>,
    corrector: DriftCorrector,
    throttle: Mutex<ReportThrottle>,
    interaction_window: Duration,
    tick_period: Duration,
    last_local_seek: AtomicCell<Option<Instant>>,
    /// Whether the player had ended on the previous tick
    ended: AtomicCell<bool>,
}

/// Ticks a [PlaybackSync] periodically until dropped
pub struct SyncDriver {
    task: JoinHandle<()>,
}

impl PlaybackSync {
    pub fn new(session: Arc<RoomSession>, engine: Arc<dyn PlaybackEngine>, config: &Config) -> Self {
        Self {
            session,
            engine,
            corrector: DriftCorrector::new(config),
            throttle: Mutex::new(ReportThrottle::new(config.report_interval())),
            interaction_window: config.interaction_window(),
            tick_period: config.driver_tick(),
            last_local_seek: AtomicCell::new(None),
            ended: AtomicCell::new(false),
        }
    }

    pub fn session(&self) -> &Arc<RoomSession> {
        &self.session
    }

    /// Samples the local player once and reconciles it with the room.
    /// Returns the actions applied to the local player.
    pub async fn tick(&self, now: Instant) -> Vec<SyncAction> {
        let room = self.session.room();
        let member = self.session.member();

        let ended = self.engine.has_ended();

        // Advance once per end, the player may take a while to load the next track
        if ended {
            if !self.ended.swap(true) {
                self.advance(&room).await;
            }

            return vec![];
        }

        self.ended.store(false);

        let local = self.local_playback(now);

        let report = if should_report(&room, member, &local) {
            self.throttle.lock().ready(now)
        } else {
            self.throttle.lock().reset();
            false
        };

        if report {
            if let Err(e) = self.session.report_position(local.position).await {
                warn!("Could not report position in room {}: {}", room.id, e);
            }
        }

        let actions = self.corrector.follow(&room, member, &local);

        for action in &actions {
            match action {
                SyncAction::Seek(position) => {
                    debug!("Snapping to {:.2}s in room {}", position, room.id);
                    self.engine.seek(*position)
                }
                SyncAction::Play => self.engine.play(),
                SyncAction::Pause => self.engine.pause(),
            }
        }

        actions
    }

    /// Seeks the local player. The shared position only moves if this member may seek.
    pub async fn seek(&self, position: f64) -> RoomResult<()> {
        self.engine.seek(position);
        self.last_local_seek.store(Some(Instant::now()));

        let room = self.session.room();

        if SyncCoordinator::new(&room).can_seek(self.session.member()) {
            self.session.seek(position).await?;
        }

        Ok(())
    }

    /// Starts ticking on the configured driver period.
    pub fn spawn(self: Arc<Self>) -> SyncDriver {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick_period);

            loop {
                ticker.tick().await;
                self.tick(Instant::now()).await;
            }
        });

        SyncDriver { task }
    }

    fn local_playback(&self, now: Instant) -> LocalPlayback {
        let interacting = self
            .last_local_seek
            .load()
            .is_some_and(|at| now.saturating_duration_since(at) < self.interaction_window);

        LocalPlayback {
            position: self.engine.current_time(),
            is_playing: self.engine.is_playing(),
            interacting,
        }
    }

    async fn advance(&self, room: &Room) {
        let Some(current) = room.current_song.as_ref().map(|s| s.key()) else {
            return;
        };

        if !SyncCoordinator::new(room).can_control(self.session.member()) {
            debug!("Track {} ended, leaving the advance to others", current);
            return;
        }

        info!("Track {} ended, advancing room {}", current, room.id);

        if let Err(e) = self.session.next().await {
            warn!("Could not advance room {}: {}", room.id, e);
        }
    }
}

impl Drop for SyncDriver {
    fn drop(&mut self) {
        self.task.abort()
    }
}
