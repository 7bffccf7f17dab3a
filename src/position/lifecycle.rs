//! Trailing stop updates and exit detection

use super::{ExitReason, ExitSignal, Position};
use crate::config::TrailingConfig;
use crate::execution::{CloseRequest, ClosedTrade, ExecutionError, ExecutionService};
use crate::market::Candle;
use crate::risk::RiskManager;
use chrono::{DateTime, Utc};

/// What applying one candle did to a position
#[derive(Debug, Clone, PartialEq)]
pub enum CandleOutcome {
    /// Candle is not newer than the last one applied
    AlreadyApplied,
    Held,
    Exit(ExitSignal),
}

/// Result of managing one symbol's open position for a tick
#[derive(Debug, Clone, PartialEq)]
pub enum ManageOutcome {
    AlreadyApplied { last_candle_at: Option<DateTime<Utc>> },
    Held(Box<Position>),
    Closed(Box<ClosedTrade>),
}

/// Applies candles to open positions
#[derive(Debug, Clone)]
pub struct PositionManager {
    config: TrailingConfig,
}

impl PositionManager {
    pub fn new(config: TrailingConfig) -> Self {
        Self { config }
    }

    /// Track the highest close, then activate or ratchet the trailing stop.
    ///
    /// Activation is measured from the reference price, the same base the
    /// stop and take-profit are placed from.
    pub fn update_trailing(&self, position: &mut Position, close: f64) {
        let trailing = &mut position.trailing;
        if close > trailing.highest_close {
            trailing.highest_close = close;
        }
        if !self.config.enabled {
            return;
        }

        if !trailing.active {
            if close >= position.reference_price * (1.0 + self.config.activation_pct) {
                trailing.active = true;
                trailing.trail_stop = Some(close * (1.0 - self.config.gap_pct));
            }
        } else {
            let candidate = trailing.highest_close * (1.0 - self.config.gap_pct);
            trailing.trail_stop = Some(match trailing.trail_stop {
                Some(current) => current.max(candidate),
                None => candidate,
            });
        }
    }

    /// Stop, then take-profit, then trailing stop. Only the first match fires.
    pub fn check_exit(&self, position: &Position, candle: &Candle) -> Option<ExitSignal> {
        if let Some(stop) = position.stop_price {
            if candle.low <= stop {
                return Some(ExitSignal {
                    reason: ExitReason::Stop,
                    trigger_price: stop,
                    exit_price: stop.min(candle.open),
                });
            }
        }
        if let Some(target) = position.take_profit_price {
            if candle.high >= target {
                return Some(ExitSignal {
                    reason: ExitReason::TakeProfit,
                    trigger_price: target,
                    exit_price: target,
                });
            }
        }
        if position.trailing.active {
            if let Some(trail) = position.trailing.trail_stop {
                if candle.low <= trail {
                    return Some(ExitSignal {
                        reason: ExitReason::TrailStop,
                        trigger_price: trail,
                        exit_price: trail.min(candle.open),
                    });
                }
            }
        }
        None
    }

    /// Apply one closed candle: trailing update, mark, then exit check
    pub fn on_candle(&self, position: &mut Position, candle: &Candle) -> CandleOutcome {
        if position
            .last_candle_at
            .is_some_and(|last| candle.timestamp <= last)
        {
            return CandleOutcome::AlreadyApplied;
        }
        position.last_candle_at = Some(candle.timestamp);
        position.mark_price = candle.close;

        self.update_trailing(position, candle.close);
        match self.check_exit(position, candle) {
            Some(exit) => CandleOutcome::Exit(exit),
            None => CandleOutcome::Held,
        }
    }

    /// Manage the open position on `symbol`, closing it through the ledger
    /// when an exit fires. A stop-loss exit arms the cooldown.
    pub fn manage(
        &self,
        ledger: &mut ExecutionService,
        risk: &RiskManager,
        portfolio_id: &str,
        symbol: &str,
        candle: &Candle,
        now: DateTime<Utc>,
    ) -> Result<ManageOutcome, ExecutionError> {
        let outcome = {
            let position = ledger
                .portfolio_mut(portfolio_id)
                .ok_or_else(|| ExecutionError::UnknownPortfolio(portfolio_id.to_string()))?
                .position_mut(symbol)
                .ok_or_else(|| ExecutionError::PositionNotFound(symbol.to_string()))?;
            match self.on_candle(position, candle) {
                CandleOutcome::AlreadyApplied => {
                    return Ok(ManageOutcome::AlreadyApplied {
                        last_candle_at: position.last_candle_at,
                    })
                }
                CandleOutcome::Held => None,
                CandleOutcome::Exit(exit) => Some(exit),
            }
        };
        let Some(outcome) = outcome else {
            let position = ledger.position_updated(portfolio_id, symbol)?;
            return Ok(ManageOutcome::Held(Box::new(position)));
        };

        let trade = ledger.close_position(CloseRequest {
            portfolio_id: portfolio_id.to_string(),
            symbol: symbol.to_string(),
            exit_price: outcome.exit_price,
            reason: outcome.reason,
            costs: risk.costs(),
            now,
        })?;

        let state = ledger
            .portfolio_mut(portfolio_id)
            .ok_or_else(|| ExecutionError::UnknownPortfolio(portfolio_id.to_string()))?;
        risk.track_realized_pnl(state, trade.net_pnl, now);
        if trade.exit_reason == ExitReason::Stop {
            risk.record_stop_out(state, now);
        }

        Ok(ManageOutcome::Closed(Box::new(trade)))
    }
}
