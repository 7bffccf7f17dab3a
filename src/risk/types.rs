//! Risk management types

use crate::config::DailyLimitBasis;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Why the entry gate refused a new position
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskBlock {
    #[error("Equity is not positive: {0}")]
    InsufficientEquity(f64),
    /// Open position count at the configured maximum
    #[error("Maximum positions reached: {open}/{max}")]
    MaxPositions { open: usize, max: usize },
    /// Today's measure at or below the negative limit
    #[error("Daily limit reached: {measure} <= -{limit}")]
    DailyOutflowLimit { measure: f64, limit: f64 },
    /// Still inside the post stop-out cooldown
    #[error("Cooldown active for another {remaining_ms}ms")]
    Cooldown { remaining_ms: i64 },
}

impl RiskBlock {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            RiskBlock::InsufficientEquity(_) => "INSUFFICIENT_EQUITY",
            RiskBlock::MaxPositions { .. } => "MAX_POSITIONS",
            RiskBlock::DailyOutflowLimit { .. } => "DAILY_OUTFLOW_LIMIT",
            RiskBlock::Cooldown { .. } => "COOLDOWN",
        }
    }
}

/// Position sizing errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    /// Entry and stop are equal or not finite
    #[error("Invalid stop {stop} for entry {entry}")]
    InvalidStop { entry: f64, stop: f64 },
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),
}

impl SizingError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            SizingError::InvalidStop { .. } => "INVALID_STOP",
            SizingError::InvalidQuantity(_) => "INVALID_QUANTITY",
        }
    }
}

/// Effective risk values behind an allowed entry, kept for audit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSnapshot {
    pub equity: f64,
    pub cash: f64,
    pub open_positions: usize,
    pub max_open_positions: usize,
    pub daily_limit_basis: DailyLimitBasis,
    /// Today's net flow or realized P&L, depending on the basis
    pub daily_measure: f64,
    pub daily_limit: f64,
    pub risk_per_trade_pct: f64,
    pub last_stop_out_at: Option<DateTime<Utc>>,
}
