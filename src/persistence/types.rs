//! Persistence record types

use crate::execution::{ClosedTrade, Fill, Side};
use crate::position::{ExitReason, Position, TrailingState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Portfolio lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortfolioStatus {
    #[default]
    Active,
    Paused,
    Closed,
}

impl PortfolioStatus {
    pub fn is_active(self) -> bool {
        self == PortfolioStatus::Active
    }
}

/// Portfolio metadata owned by the external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMeta {
    pub portfolio_id: String,
    pub cash: f64,
    pub starting_capital: f64,
    pub status: PortfolioStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Upsert keyed by (portfolio, symbol, position id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub portfolio_id: String,
    pub symbol: String,
    pub position_id: Uuid,
    pub status: PositionStatus,
    pub size: f64,
    pub reference_price: f64,
    pub entry_price: f64,
    pub entry_fee: f64,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub trailing_active: bool,
    pub highest_close: f64,
    pub trail_stop: Option<f64>,
    pub mark_price: f64,
    pub last_candle_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<f64>,
    pub net_pnl: Option<f64>,
}

impl PositionRecord {
    pub fn key(&self) -> (String, String, Uuid) {
        (self.portfolio_id.clone(), self.symbol.clone(), self.position_id)
    }

    pub fn open(portfolio_id: &str, position: &Position) -> Self {
        Self {
            portfolio_id: portfolio_id.to_string(),
            symbol: position.symbol.clone(),
            position_id: position.id,
            status: PositionStatus::Open,
            size: position.size,
            reference_price: position.reference_price,
            entry_price: position.entry_price,
            entry_fee: position.entry_fee,
            stop_price: position.stop_price,
            take_profit_price: position.take_profit_price,
            trailing_active: position.trailing.active,
            highest_close: position.trailing.highest_close,
            trail_stop: position.trailing.trail_stop,
            mark_price: position.mark_price,
            last_candle_at: position.last_candle_at,
            opened_at: position.opened_at,
            closed_at: None,
            exit_reason: None,
            exit_price: None,
            net_pnl: None,
        }
    }

    pub fn closed(portfolio_id: &str, trade: &ClosedTrade) -> Self {
        Self {
            status: PositionStatus::Closed,
            closed_at: Some(trade.closed_at),
            exit_reason: Some(trade.exit_reason),
            exit_price: Some(trade.exit_fill.price),
            net_pnl: Some(trade.net_pnl),
            ..Self::open(portfolio_id, &trade.position)
        }
    }

    /// Rebuild the in-memory position from an open record
    pub fn to_position(&self) -> Position {
        Position {
            id: self.position_id,
            symbol: self.symbol.clone(),
            size: self.size,
            reference_price: self.reference_price,
            entry_price: self.entry_price,
            entry_fee: self.entry_fee,
            stop_price: self.stop_price,
            take_profit_price: self.take_profit_price,
            trailing: TrailingState {
                active: self.trailing_active,
                highest_close: self.highest_close,
                trail_stop: self.trail_stop,
            },
            opened_at: self.opened_at,
            mark_price: self.mark_price,
            last_candle_at: self.last_candle_at,
        }
    }
}

/// Upsert keyed by (portfolio, symbol, position id, order id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub portfolio_id: String,
    pub symbol: String,
    pub position_id: Uuid,
    pub order_id: Uuid,
    pub side: Side,
    pub reference_price: f64,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderRecord {
    pub fn key(&self) -> (String, String, Uuid, Uuid) {
        (
            self.portfolio_id.clone(),
            self.symbol.clone(),
            self.position_id,
            self.order_id,
        )
    }

    pub fn from_fill(portfolio_id: &str, fill: &Fill) -> Self {
        Self {
            portfolio_id: portfolio_id.to_string(),
            symbol: fill.symbol.clone(),
            position_id: fill.position_id,
            order_id: fill.order_id,
            side: fill.side,
            reference_price: fill.reference_price,
            price: fill.price,
            size: fill.size,
            fee: fill.fee,
            timestamp: fill.timestamp,
        }
    }
}

/// One write the ledger wants persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PersistRequest {
    Position(PositionRecord),
    Order(OrderRecord),
    /// Cash balance after a fill; the stored status is left alone
    Cash { portfolio_id: String, cash: f64 },
}
