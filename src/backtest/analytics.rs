//! Backtest analytics and reporting

use crate::execution::ClosedTrade;
use serde::Serialize;

/// Summary statistics for one portfolio's replay
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub starting_capital: f64,
    pub final_equity: f64,
    /// Net P&L after fees and slippage, marked to the last close
    pub net_pnl: f64,
    /// Net P&L as a fraction of starting capital
    pub return_pct: f64,
    /// Winning trades as a fraction of all closed trades
    pub win_rate: f64,
    /// Gross profit over gross loss
    pub profit_factor: f64,
    /// Maximum drawdown (absolute)
    pub max_drawdown: f64,
    /// Maximum drawdown as a fraction of the running peak
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub avg_trade_duration_secs: i64,
}

impl BacktestSummary {
    /// Build from closed trades and the per-tick equity curve
    pub fn from_run(starting_capital: f64, trades: &[ClosedTrade], equity_curve: &[f64]) -> Self {
        let final_equity = equity_curve.last().copied().unwrap_or(starting_capital);
        let net_pnl = final_equity - starting_capital;

        let wins = trades.iter().filter(|t| t.net_pnl > 0.0).count();
        let gross_profit: f64 = trades.iter().map(|t| t.net_pnl.max(0.0)).sum();
        let gross_loss: f64 = trades.iter().map(|t| (-t.net_pnl).max(0.0)).sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = max_drawdown(starting_capital, equity_curve);
        let avg_trade_duration_secs = if trades.is_empty() {
            0
        } else {
            trades
                .iter()
                .map(|t| (t.closed_at - t.position.opened_at).num_seconds())
                .sum::<i64>()
                / trades.len() as i64
        };

        Self {
            starting_capital,
            final_equity,
            net_pnl,
            return_pct: if starting_capital > 0.0 {
                net_pnl / starting_capital
            } else {
                0.0
            },
            win_rate: if trades.is_empty() {
                0.0
            } else {
                wins as f64 / trades.len() as f64
            },
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            total_trades: trades.len(),
            avg_trade_duration_secs,
        }
    }

    /// Format as table for CLI output
    pub fn format_table(&self, portfolio_id: &str) -> String {
        format!(
            r#"
══════════════════════════════════════════════════════
               REPLAY RESULTS: {}
══════════════════════════════════════════════════════

PERFORMANCE
───────────────────────────────────────────────────────
Starting Capital: {:.2}
Final Equity:     {:.2}
Net P&L:          {:+.2} ({:+.2}%)
Max Drawdown:     {:.2} ({:.2}%)
Win Rate:         {:.1}%
Profit Factor:    {:.2}

ACTIVITY
───────────────────────────────────────────────────────
Total Trades:     {}
Avg Duration:     {}s
══════════════════════════════════════════════════════
"#,
            portfolio_id,
            self.starting_capital,
            self.final_equity,
            self.net_pnl,
            self.return_pct * 100.0,
            self.max_drawdown,
            self.max_drawdown_pct * 100.0,
            self.win_rate * 100.0,
            self.profit_factor,
            self.total_trades,
            self.avg_trade_duration_secs,
        )
    }
}

/// Largest peak-to-trough fall, absolute and relative to the peak
fn max_drawdown(starting_capital: f64, equity_curve: &[f64]) -> (f64, f64) {
    let mut peak = starting_capital;
    let mut worst = 0.0_f64;
    let mut worst_pct = 0.0_f64;
    for &equity in equity_curve {
        peak = peak.max(equity);
        let drawdown = peak - equity;
        worst = worst.max(drawdown);
        if peak > 0.0 {
            worst_pct = worst_pct.max(drawdown / peak);
        }
    }
    (worst, worst_pct)
}
