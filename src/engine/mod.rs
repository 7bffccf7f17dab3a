//! Evaluation engine
//!
//! The orchestrator runs one tick across every portfolio and symbol; the
//! scheduler makes sure ticks never overlap. Time always comes in from a
//! [`Clock`] so replay and live runs take the same path.

mod clock;
mod orchestrator;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use orchestrator::{Engine, TickReport};
pub use scheduler::Scheduler;
