//! Entry gates and position sizing

use super::{RiskBlock, RiskSnapshot, SizingError};
use crate::config::{DailyLimitBasis, RiskConfig};
use crate::execution::{FillCosts, PortfolioState};
use crate::market::Timeframe;
use chrono::{DateTime, Duration, Utc};

/// Stateless gatekeeper for one portfolio's effective risk config
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    signal_timeframe: Timeframe,
}

impl RiskManager {
    pub fn new(config: RiskConfig, signal_timeframe: Timeframe) -> Self {
        Self {
            config,
            signal_timeframe,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn costs(&self) -> FillCosts {
        FillCosts {
            fee_bps: self.config.fee_bps,
            slippage_bps: self.config.slippage_bps,
        }
    }

    /// Cooldown length: whole signal-timeframe bars
    pub fn cooldown(&self) -> Duration {
        Duration::milliseconds(
            self.signal_timeframe.duration_ms() * i64::from(self.config.cooldown_bars),
        )
    }

    /// Run the entry gates in order. The first failing gate wins.
    pub fn can_open_position(
        &self,
        state: &PortfolioState,
        now: DateTime<Utc>,
    ) -> Result<RiskSnapshot, RiskBlock> {
        let equity = state.equity();
        if !(equity.is_finite() && equity > 0.0) {
            return Err(RiskBlock::InsufficientEquity(equity));
        }

        let open = state.open_count();
        if open >= self.config.max_open_positions {
            return Err(RiskBlock::MaxPositions {
                open,
                max: self.config.max_open_positions,
            });
        }

        let measure = match self.config.daily_limit_basis {
            DailyLimitBasis::NetFlow => state.daily.net_flow_at(now),
            DailyLimitBasis::RealizedPnl => state.daily.realized_pnl_at(now),
        };
        let limit = equity * self.config.max_daily_net_outflow_pct;
        if measure <= -limit {
            return Err(RiskBlock::DailyOutflowLimit { measure, limit });
        }

        if let Some(last) = state.last_stop_out_at {
            let elapsed = now - last;
            let cooldown = self.cooldown();
            if elapsed < cooldown {
                return Err(RiskBlock::Cooldown {
                    remaining_ms: (cooldown - elapsed).num_milliseconds(),
                });
            }
        }

        Ok(RiskSnapshot {
            equity,
            cash: state.cash,
            open_positions: open,
            max_open_positions: self.config.max_open_positions,
            daily_limit_basis: self.config.daily_limit_basis,
            daily_measure: measure,
            daily_limit: limit,
            risk_per_trade_pct: self.config.risk_per_trade_pct,
            last_stop_out_at: state.last_stop_out_at,
        })
    }

    /// Quantity risking `risk_per_trade_pct` of equity between entry and
    /// stop, capped by what `available_cash` can buy at `entry`.
    pub fn compute_position_size(
        &self,
        equity: f64,
        entry: f64,
        stop: f64,
        available_cash: f64,
    ) -> Result<f64, SizingError> {
        let per_unit_risk = (entry - stop).abs();
        if !per_unit_risk.is_finite() || per_unit_risk == 0.0 {
            return Err(SizingError::InvalidStop { entry, stop });
        }

        let risk_dollars = equity * self.config.risk_per_trade_pct;
        let raw_qty = risk_dollars / per_unit_risk;
        let cash_qty = available_cash / entry;
        let qty = raw_qty.min(cash_qty);

        if !qty.is_finite() || qty <= 0.0 {
            return Err(SizingError::InvalidQuantity(qty));
        }
        Ok(qty)
    }

    /// Arm the cooldown
    pub fn record_stop_out(&self, state: &mut PortfolioState, at: DateTime<Utc>) {
        state.last_stop_out_at = Some(at);
    }

    pub fn track_realized_pnl(&self, state: &mut PortfolioState, pnl: f64, now: DateTime<Utc>) {
        state.daily.record_pnl(pnl, now);
        state.realized_pnl += pnl;
    }
}
