mod config;
mod model;
mod util;

pub mod membership;
pub mod queuing;
pub mod sync;

pub use config::*;
pub use model::*;
pub use util::*;
