//! Paper execution ledger

use super::{ClosedTrade, ExecutionError, Fill, FillCosts, OpenedPosition, PortfolioState, Side};
use crate::persistence::{OrderRecord, PersistRequest, PositionRecord};
use crate::position::{ExitReason, Position, TrailingState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Parameters for opening a long position
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub portfolio_id: String,
    pub symbol: String,
    /// Price before slippage, normally the latest close
    pub reference_price: f64,
    pub stop_price: Option<f64>,
    pub size: f64,
    pub take_profit_r: f64,
    pub require_stop_loss: bool,
    pub max_open_positions: usize,
    pub costs: FillCosts,
    /// Open time of the candle the entry was decided on
    pub entry_candle_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Parameters for closing a position
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub portfolio_id: String,
    pub symbol: String,
    /// Price before slippage
    pub exit_price: f64,
    pub reason: ExitReason,
    pub costs: FillCosts,
    pub now: DateTime<Utc>,
}

/// Owns every portfolio's cash and positions.
///
/// Each successful mutation queues persistence requests in an outbox that
/// the caller drains; nothing here waits on I/O.
#[derive(Debug, Default)]
pub struct ExecutionService {
    portfolios: HashMap<String, PortfolioState>,
    outbox: Vec<PersistRequest>,
}

impl ExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a portfolio, replacing any previous state with the same id
    pub fn register_portfolio(&mut self, state: PortfolioState) {
        self.portfolios.insert(state.id.clone(), state);
    }

    pub fn portfolio(&self, id: &str) -> Option<&PortfolioState> {
        self.portfolios.get(id)
    }

    pub fn portfolio_mut(&mut self, id: &str) -> Option<&mut PortfolioState> {
        self.portfolios.get_mut(id)
    }

    pub fn portfolios(&self) -> impl Iterator<Item = &PortfolioState> {
        self.portfolios.values()
    }

    /// Take all queued persistence requests
    pub fn drain_outbox(&mut self) -> Vec<PersistRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Queue a persistence update for a position whose marks or trailing
    /// state changed, returning a copy of it
    pub fn position_updated(
        &mut self,
        portfolio_id: &str,
        symbol: &str,
    ) -> Result<Position, ExecutionError> {
        let position = self
            .portfolios
            .get(portfolio_id)
            .ok_or_else(|| ExecutionError::UnknownPortfolio(portfolio_id.to_string()))?
            .position(symbol)
            .ok_or_else(|| ExecutionError::PositionNotFound(symbol.to_string()))?
            .clone();
        self.outbox
            .push(PersistRequest::Position(PositionRecord::open(portfolio_id, &position)));
        Ok(position)
    }

    /// Buy at the slipped reference price and record the position
    pub fn open_position(&mut self, req: OpenRequest) -> Result<OpenedPosition, ExecutionError> {
        let state = self
            .portfolios
            .get_mut(&req.portfolio_id)
            .ok_or_else(|| ExecutionError::UnknownPortfolio(req.portfolio_id.clone()))?;

        if req.require_stop_loss && req.stop_price.is_none() {
            return Err(ExecutionError::MissingStop);
        }
        if let Some(stop) = req.stop_price {
            if !(stop.is_finite() && stop > 0.0 && stop < req.reference_price) {
                return Err(ExecutionError::InvalidStop {
                    entry: req.reference_price,
                    stop,
                });
            }
        }
        if !(req.size.is_finite() && req.size > 0.0) {
            return Err(ExecutionError::InvalidQuantity(req.size));
        }
        if state.position(&req.symbol).is_some() {
            return Err(ExecutionError::DuplicatePosition(req.symbol));
        }
        if state.open_count() >= req.max_open_positions {
            return Err(ExecutionError::MaxPositions(req.max_open_positions));
        }

        let price = req.costs.buy_price(req.reference_price);
        let fee = req.costs.fee(price, req.size);
        let required = price * req.size + fee;
        if !(required <= state.cash) {
            return Err(ExecutionError::InsufficientCash {
                required,
                available: state.cash,
            });
        }

        let take_profit_price = req
            .stop_price
            .map(|stop| req.reference_price + req.take_profit_r * (req.reference_price - stop));

        let position = Position {
            id: Uuid::new_v4(),
            symbol: req.symbol.clone(),
            size: req.size,
            reference_price: req.reference_price,
            entry_price: price,
            entry_fee: fee,
            stop_price: req.stop_price,
            take_profit_price,
            trailing: TrailingState::new(req.reference_price),
            opened_at: req.now,
            mark_price: req.reference_price,
            last_candle_at: req.entry_candle_at,
        };
        let fill = Fill {
            order_id: Uuid::new_v4(),
            position_id: position.id,
            symbol: req.symbol.clone(),
            side: Side::Buy,
            reference_price: req.reference_price,
            price,
            size: req.size,
            fee,
            timestamp: req.now,
        };

        state.cash -= required;
        state.daily.record_flow(-required, req.now);
        state.positions.push(position.clone());
        let cash_after = state.cash;

        self.outbox.push(PersistRequest::Position(PositionRecord::open(
            &req.portfolio_id,
            &position,
        )));
        self.outbox
            .push(PersistRequest::Order(OrderRecord::from_fill(&req.portfolio_id, &fill)));
        self.outbox.push(PersistRequest::Cash {
            portfolio_id: req.portfolio_id.clone(),
            cash: cash_after,
        });

        metrics::counter!("engine_fills_total", "side" => Side::Buy.as_str()).increment(1);
        tracing::info!(
            portfolio = %req.portfolio_id,
            symbol = %req.symbol,
            size = req.size,
            price,
            fee,
            stop = ?req.stop_price,
            take_profit = ?take_profit_price,
            cash_after,
            "Opened position"
        );

        Ok(OpenedPosition {
            position,
            fill,
            cash_after,
        })
    }

    /// Sell the whole position at the slipped exit price
    pub fn close_position(&mut self, req: CloseRequest) -> Result<ClosedTrade, ExecutionError> {
        let state = self
            .portfolios
            .get_mut(&req.portfolio_id)
            .ok_or_else(|| ExecutionError::UnknownPortfolio(req.portfolio_id.clone()))?;
        let index = state
            .positions
            .iter()
            .position(|p| p.symbol == req.symbol)
            .ok_or_else(|| ExecutionError::PositionNotFound(req.symbol.clone()))?;

        let mut position = state.positions.remove(index);
        let price = req.costs.sell_price(req.exit_price);
        let fee = req.costs.fee(price, position.size);
        let proceeds = price * position.size - fee;
        let net_pnl = (price - position.entry_price) * position.size - position.entry_fee - fee;

        state.cash += proceeds;
        state.daily.record_flow(proceeds, req.now);
        let cash_after = state.cash;
        position.mark_price = req.exit_price;

        let exit_fill = Fill {
            order_id: Uuid::new_v4(),
            position_id: position.id,
            symbol: req.symbol.clone(),
            side: Side::Sell,
            reference_price: req.exit_price,
            price,
            size: position.size,
            fee,
            timestamp: req.now,
        };
        let trade = ClosedTrade {
            position,
            exit_reason: req.reason,
            exit_fill,
            closed_at: req.now,
            net_pnl,
        };

        self.outbox.push(PersistRequest::Position(PositionRecord::closed(
            &req.portfolio_id,
            &trade,
        )));
        self.outbox.push(PersistRequest::Order(OrderRecord::from_fill(
            &req.portfolio_id,
            &trade.exit_fill,
        )));
        self.outbox.push(PersistRequest::Cash {
            portfolio_id: req.portfolio_id.clone(),
            cash: cash_after,
        });

        metrics::counter!("engine_fills_total", "side" => Side::Sell.as_str()).increment(1);
        tracing::info!(
            portfolio = %req.portfolio_id,
            symbol = %req.symbol,
            reason = req.reason.code(),
            price,
            fee,
            net_pnl,
            "Closed position"
        );

        Ok(trade)
    }
}
