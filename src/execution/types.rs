//! Execution types

use crate::position::{ExitReason, Position, PositionState};
use crate::risk::DailyLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Fill direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Fee and slippage in basis points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillCosts {
    pub fee_bps: f64,
    pub slippage_bps: f64,
}

impl FillCosts {
    /// Buys fill above the reference price
    pub fn buy_price(&self, reference: f64) -> f64 {
        reference * (1.0 + self.slippage_bps / 10_000.0)
    }

    /// Sells fill below the reference price
    pub fn sell_price(&self, reference: f64) -> f64 {
        reference * (1.0 - self.slippage_bps / 10_000.0)
    }

    pub fn fee(&self, fill_price: f64, size: f64) -> f64 {
        fill_price * size * self.fee_bps / 10_000.0
    }

    /// Cash that can buy notional at the reference price once slippage
    /// and fees are paid on top.
    pub fn spendable(&self, cash: f64) -> f64 {
        let multiplier = (1.0 + self.slippage_bps / 10_000.0) * (1.0 + self.fee_bps / 10_000.0);
        (cash / multiplier).max(0.0)
    }
}

/// An executed paper trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub position_id: Uuid,
    pub symbol: String,
    pub side: Side,
    /// Price before slippage
    pub reference_price: f64,
    /// Price after slippage
    pub price: f64,
    pub size: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

/// A position that has been exited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_reason: ExitReason,
    pub exit_fill: Fill,
    pub closed_at: DateTime<Utc>,
    /// (exit fill - entry fill) x size - entry fee - exit fee
    pub net_pnl: f64,
}

impl ClosedTrade {
    pub fn state(&self) -> PositionState {
        PositionState::Closed(self.exit_reason)
    }
}

/// Result of a successful open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedPosition {
    pub position: Position,
    pub fill: Fill,
    pub cash_after: f64,
}

/// Cash, positions and daily bookkeeping for one portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub id: String,
    pub starting_capital: f64,
    pub cash: f64,
    pub positions: Vec<Position>,
    pub daily: DailyLedger,
    pub last_stop_out_at: Option<DateTime<Utc>>,
    pub realized_pnl: f64,
}

impl PortfolioState {
    pub fn new(id: impl Into<String>, starting_cash: f64) -> Self {
        Self {
            id: id.into(),
            starting_capital: starting_cash,
            cash: starting_cash,
            positions: vec![],
            daily: DailyLedger::default(),
            last_stop_out_at: None,
            realized_pnl: 0.0,
        }
    }

    /// Cash plus open positions at their last mark
    pub fn equity(&self) -> f64 {
        self.cash + self.positions.iter().map(Position::market_value).sum::<f64>()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.symbol == symbol)
    }
}

/// Execution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// Stop price required but absent
    #[error("Stop price required")]
    MissingStop,
    /// Stop not strictly between zero and the entry price
    #[error("Invalid stop {stop} for entry {entry}")]
    InvalidStop { entry: f64, stop: f64 },
    /// Size not a positive finite number
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),
    /// Cost plus fee exceeds cash
    #[error("Insufficient cash: need {required}, have {available}")]
    InsufficientCash { required: f64, available: f64 },
    /// Opening would exceed the position limit
    #[error("Maximum positions reached: {0}")]
    MaxPositions(usize),
    /// A position is already open on the symbol
    #[error("Position already open on {0}")]
    DuplicatePosition(String),
    #[error("No open position on {0}")]
    PositionNotFound(String),
    #[error("Unknown portfolio: {0}")]
    UnknownPortfolio(String),
}

impl ExecutionError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::MissingStop => "MISSING_STOP",
            ExecutionError::InvalidStop { .. } => "INVALID_STOP",
            ExecutionError::InvalidQuantity(_) => "INVALID_QUANTITY",
            ExecutionError::InsufficientCash { .. } => "INSUFFICIENT_CASH",
            ExecutionError::MaxPositions(_) => "MAX_POSITIONS",
            ExecutionError::DuplicatePosition(_) => "DUPLICATE_POSITION",
            ExecutionError::PositionNotFound(_) => "POSITION_NOT_FOUND",
            ExecutionError::UnknownPortfolio(_) => "UNKNOWN_PORTFOLIO",
        }
    }
}
