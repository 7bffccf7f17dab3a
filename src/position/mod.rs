//! Position lifecycle module
//!
//! `Open(not trailing) -> Open(trailing) -> Closed(stop | tp | trail stop)`.

mod lifecycle;
mod types;

pub use lifecycle::{CandleOutcome, ManageOutcome, PositionManager};
pub use types::{ExitReason, ExitSignal, Position, PositionState, TrailingState};
