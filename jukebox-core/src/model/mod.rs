mod queue_item;
mod room;
mod room_id;
mod update;

pub use queue_item::*;
pub use room::*;
pub use room_id::*;
pub use update::*;

