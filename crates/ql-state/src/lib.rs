mod collections;
mod history;
mod persist;
mod rng;
mod state;
mod tunnel;

pub use history::{Checkpoint, History, HistorySnapshot};
pub use rng::RandomState;
pub use state::{NarrativeState, ALTERNATIVE_PREFIX, RESERVED_PREFIX};
pub use tunnel::{TunnelFrame, TunnelStack};
