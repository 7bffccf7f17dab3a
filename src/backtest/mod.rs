//! Backtesting module
//!
//! Replays stored candles through the same [`Engine`](crate::engine::Engine)
//! the live loop uses, with a manual clock and in-memory collaborators.

mod analytics;
mod runner;

pub use analytics::BacktestSummary;
pub use runner::{ReplayResult, ReplayRunner};
