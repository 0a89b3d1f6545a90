use std::time::Duration;

/// The configuration of room synchronization
#[derive(Debug, Clone)]
pub struct Config {
    /// How far a follower may drift from the leader before it is corrected
    pub drift_tolerance_in_seconds: f64,
    /// How often the leader may write its position to the room
    pub report_interval_in_seconds: f64,
    /// How often the playback driver samples the local player
    pub driver_tick_in_seconds: f64,
    /// How long after a local seek the follower is considered to be interacting
    pub interaction_window_in_seconds: f64,
    /// How often a polling subscription reads the room
    pub poll_interval_in_seconds: f64,
    /// How long a room may be inactive before it is swept
    pub retention_in_minutes: u64,
    /// How often expired rooms are swept
    pub sweep_interval_in_seconds: u64,
    /// How long a cross-process marker file exists before its writer removes it
    pub marker_ttl_in_seconds: f64,
    /// How often the marker directory is scanned for new markers
    pub marker_scan_in_millis: u64,
    /// How many snapshots a push channel buffers per subscriber
    pub broadcast_capacity: usize,
}

impl Config {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs_f64(self.report_interval_in_seconds)
    }

    pub fn driver_tick(&self) -> Duration {
        Duration::from_secs_f64(self.driver_tick_in_seconds)
    }

    pub fn interaction_window(&self) -> Duration {
        Duration::from_secs_f64(self.interaction_window_in_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_in_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_in_seconds)
    }

    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.marker_ttl_in_seconds)
    }

    pub fn marker_scan_interval(&self) -> Duration {
        Duration::from_millis(self.marker_scan_in_millis)
    }

    /// The retention window in milliseconds, comparable to room timestamps
    pub fn retention_in_millis(&self) -> i64 {
        (self.retention_in_minutes * 60 * 1000) as i64
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Anything tighter makes followers stutter on slow players
            drift_tolerance_in_seconds: 0.35,
            report_interval_in_seconds: 2.0,
            driver_tick_in_seconds: 1.0,
            interaction_window_in_seconds: 1.0,
            poll_interval_in_seconds: 3.0,
            retention_in_minutes: 30,
            sweep_interval_in_seconds: 60,
            marker_ttl_in_seconds: 2.0,
            marker_scan_in_millis: 250,
            broadcast_capacity: 64,
        }
    }
}
