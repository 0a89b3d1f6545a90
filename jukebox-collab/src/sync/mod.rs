//! Drives a local player from the shared room state.

mod driver;

pub use driver::*;

/// Represents the player embedded in a client.
/// Positions are in seconds.
pub trait PlaybackEngine
where
    Self: 'static + Sync + Send,
{
    fn play(&self);
    fn pause(&self);
    fn seek(&self, position: f64);

    fn current_time(&self) -> f64;
    fn is_playing(&self) -> bool;
    /// Whether the current track played to its end.
    fn has_ended(&self) -> bool;
}
