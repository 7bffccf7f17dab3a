//! Deterministic replay over the live engine

use super::BacktestSummary;
use crate::audit::{Decision, MemoryAuditSink};
use crate::config::Config;
use crate::engine::{Clock, Engine, ManualClock};
use crate::execution::ClosedTrade;
use crate::market::{Candle, CandleSource, Timeframe};
use crate::persistence::MemoryStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a replay produced
#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub ticks: u64,
    pub decisions: Vec<Decision>,
    /// Closed trades by portfolio id
    pub trades: BTreeMap<String, Vec<ClosedTrade>>,
    /// Equity after every tick, by portfolio id
    pub equity_curves: BTreeMap<String, Vec<f64>>,
    pub summaries: BTreeMap<String, BacktestSummary>,
}

/// Steps a manual clock one signal bar at a time through [`Engine::tick`]
pub struct ReplayRunner {
    config: Config,
    source: Arc<dyn CandleSource>,
}

impl ReplayRunner {
    pub fn new(config: Config, source: Arc<dyn CandleSource>) -> Self {
        Self { config, source }
    }

    /// First and last instants at which a signal candle has just closed
    pub fn span(candles: &[Candle], timeframe: Timeframe) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut stamps = candles
            .iter()
            .filter(|c| c.timeframe == timeframe)
            .map(|c| c.close_time());
        let first = stamps.next()?;
        let (lo, hi) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        let settle = Duration::milliseconds(1);
        Some((lo + settle, hi + settle))
    }

    /// Tick from `start` to `end` inclusive
    pub async fn run(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<ReplayResult> {
        anyhow::ensure!(start <= end, "replay start {start} is after end {end}");

        let step = self.config.engine.signal_timeframe.duration();
        let audit = Arc::new(MemoryAuditSink::new());
        let mut engine = Engine::new(
            self.config.clone(),
            self.source.clone(),
            Arc::new(MemoryStore::new()),
            audit.clone(),
        );
        engine.bootstrap().await;

        let clock = ManualClock::new(start);
        let mut trades: BTreeMap<String, Vec<ClosedTrade>> = BTreeMap::new();
        let mut equity_curves: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        while clock.now() <= end {
            let report = engine.tick(clock.now()).await;
            for (portfolio, trade) in report.closed {
                trades.entry(portfolio).or_default().push(trade);
            }
            for (portfolio, equity) in report.equity {
                equity_curves.entry(portfolio).or_default().push(equity);
            }
            clock.advance(step);
        }
        let ticks = engine.tick_count();
        engine.shutdown().await;

        let summaries = self
            .config
            .portfolios
            .iter()
            .map(|p| {
                let summary = BacktestSummary::from_run(
                    p.starting_cash,
                    trades.get(&p.id).map(Vec::as_slice).unwrap_or_default(),
                    equity_curves.get(&p.id).map(Vec::as_slice).unwrap_or_default(),
                );
                (p.id.clone(), summary)
            })
            .collect();

        tracing::info!(ticks, %start, %end, "Replay finished");
        Ok(ReplayResult {
            ticks,
            decisions: audit.drain(),
            trades,
            equity_curves,
            summaries,
        })
    }
}
