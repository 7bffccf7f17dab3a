//! Decision record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the engine did, or would do, for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Portfolio metadata short-circuit (inactive/paused)
    Portfolio,
    /// Candle fetch failed or the window has a gap
    MarketData,
    PositionManagement,
    RiskBlock,
    Indicators,
    Signal,
    Execution,
    /// Unexpected failure while evaluating
    Error,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Portfolio => "PORTFOLIO",
            Stage::MarketData => "MARKET_DATA",
            Stage::PositionManagement => "POSITION_MANAGEMENT",
            Stage::RiskBlock => "RISK_BLOCK",
            Stage::Indicators => "INDICATORS",
            Stage::Signal => "SIGNAL",
            Stage::Execution => "EXECUTION",
            Stage::Error => "ERROR",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One auditable decision per portfolio, symbol and tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub tick: u64,
    pub at: DateTime<Utc>,
    pub portfolio_id: String,
    pub symbol: String,
    pub stage: Stage,
    pub action: Action,
    /// Stable reason code, e.g. `COOLDOWN` or `ENTRY_OK`
    pub reason: String,
    /// Free-form key/value payload
    pub debug: serde_json::Value,
}

impl Decision {
    pub fn new(
        tick: u64,
        at: DateTime<Utc>,
        portfolio_id: impl Into<String>,
        symbol: impl Into<String>,
        stage: Stage,
        action: Action,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tick,
            at,
            portfolio_id: portfolio_id.into(),
            symbol: symbol.into(),
            stage,
            action,
            reason: reason.into(),
            debug: serde_json::Value::Null,
        }
    }

    pub fn with_debug(mut self, debug: serde_json::Value) -> Self {
        self.debug = debug;
        self
    }
}
