//! Risk management module
//!
//! Entry gates, risk-based position sizing and the daily accumulator.
//! The manager never holds portfolio state; it reads and updates the
//! [`PortfolioState`](crate::execution::PortfolioState) passed per call.

mod daily;
mod manager;
mod types;

pub use daily::DailyLedger;
pub use manager::RiskManager;
pub use types::{RiskBlock, RiskSnapshot, SizingError};
