//! Signal generation module
//!
//! Long-only trend-pullback entry: trade with the regime trend, enter on a
//! green candle that has pulled back to the fast EMA with RSI in band.

mod evaluator;
mod types;

pub use evaluator::evaluate_entry;
pub use types::{SignalDecision, SignalReason, SignalValues};
