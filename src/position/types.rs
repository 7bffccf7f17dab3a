//! Position types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a position closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Candle low reached the initial stop
    #[serde(rename = "STOP")]
    Stop,
    /// Candle high reached the take-profit target
    #[serde(rename = "TP")]
    TakeProfit,
    /// Candle low reached the trailing stop
    #[serde(rename = "TRAIL_STOP")]
    TrailStop,
}

impl ExitReason {
    /// Stable reason code
    pub fn code(self) -> &'static str {
        match self {
            ExitReason::Stop => "STOP",
            ExitReason::TakeProfit => "TP",
            ExitReason::TrailStop => "TRAIL_STOP",
        }
    }
}

/// Trailing stop bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingState {
    pub active: bool,
    /// Highest close seen since entry
    pub highest_close: f64,
    /// Only ever ratchets upward once set
    pub trail_stop: Option<f64>,
}

impl TrailingState {
    pub fn new(entry_price: f64) -> Self {
        Self {
            active: false,
            highest_close: entry_price,
            trail_stop: None,
        }
    }
}

/// Lifecycle state of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open { trailing: bool },
    Closed(ExitReason),
}

/// An open long position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub size: f64,
    /// Price the signal asked for, before slippage
    pub reference_price: f64,
    /// Filled entry price, after slippage
    pub entry_price: f64,
    pub entry_fee: f64,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub trailing: TrailingState,
    pub opened_at: DateTime<Utc>,
    /// Last close applied to this position
    pub mark_price: f64,
    /// Open time of the last candle applied; a candle is never applied twice
    pub last_candle_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn state(&self) -> PositionState {
        PositionState::Open {
            trailing: self.trailing.active,
        }
    }

    pub fn cost_basis(&self) -> f64 {
        self.entry_price * self.size
    }

    pub fn market_value(&self) -> f64 {
        self.mark_price * self.size
    }

    /// Mark-to-market P&L before exit costs
    pub fn unrealized_pnl(&self) -> f64 {
        (self.mark_price - self.entry_price) * self.size - self.entry_fee
    }
}

/// Exit detected on a candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Level that was breached
    pub trigger_price: f64,
    /// Price handed to execution before slippage
    pub exit_price: f64,
}
