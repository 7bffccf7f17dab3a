//! Per-tick evaluation across portfolios and symbols

use crate::audit::{Action, AuditSink, Decision, Stage};
use crate::config::Config;
use crate::execution::{ClosedTrade, ExecutionService, Fill, OpenRequest, PortfolioState};
use crate::indicators::compute_indicators;
use crate::market::{CandleSource, CandleWindow, Timeframe};
use crate::persistence::{PersistenceStore, PersistenceWriter, PortfolioMeta, PortfolioStatus};
use crate::position::{ManageOutcome, PositionManager};
use crate::risk::RiskManager;
use crate::signal::evaluate_entry;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Sizing keeps this fraction of spendable cash back for float error
const CASH_HEADROOM: f64 = 1e-9;

struct PortfolioRuntime {
    id: String,
    risk: RiskManager,
    /// Last status read from the store, used when a read fails
    status: PortfolioStatus,
}

/// Everything one tick produced
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub at: DateTime<Utc>,
    pub decisions: Vec<Decision>,
    /// Entry fills by portfolio id
    pub opened: Vec<(String, Fill)>,
    /// Exits by portfolio id
    pub closed: Vec<(String, ClosedTrade)>,
    /// Equity per portfolio after the tick
    pub equity: BTreeMap<String, f64>,
}

impl TickReport {
    fn new(tick: u64, at: DateTime<Utc>) -> Self {
        Self {
            tick,
            at,
            decisions: vec![],
            opened: vec![],
            closed: vec![],
            equity: BTreeMap::new(),
        }
    }
}

/// Labels shared by every decision for one portfolio and symbol
struct Scope<'a> {
    tick: u64,
    now: DateTime<Utc>,
    portfolio: &'a str,
    symbol: &'a str,
}

impl Scope<'_> {
    fn decide(&self, stage: Stage, action: Action, reason: &str) -> Decision {
        Decision::new(self.tick, self.now, self.portfolio, self.symbol, stage, action, reason)
    }
}

/// The evaluation orchestrator.
///
/// Owns the execution ledger and is the only component that talks to
/// candle sources, the persistence store and the audit sink. Portfolios
/// and symbols are evaluated strictly one after another.
pub struct Engine {
    config: Config,
    candles: Arc<dyn CandleSource>,
    store: Arc<dyn PersistenceStore>,
    writer: PersistenceWriter,
    audit: Arc<dyn AuditSink>,
    ledger: ExecutionService,
    portfolios: Vec<PortfolioRuntime>,
    positions: PositionManager,
    tick: u64,
}

impl Engine {
    /// Build an engine for every configured portfolio.
    ///
    /// Spawns the persistence writer, so it must be called inside a tokio
    /// runtime.
    pub fn new(
        config: Config,
        candles: Arc<dyn CandleSource>,
        store: Arc<dyn PersistenceStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let mut ledger = ExecutionService::new();
        let portfolios = config
            .portfolios
            .iter()
            .map(|p| {
                ledger.register_portfolio(PortfolioState::new(p.id.clone(), p.starting_cash));
                PortfolioRuntime {
                    id: p.id.clone(),
                    risk: RiskManager::new(config.risk_for(p), config.engine.signal_timeframe),
                    status: p.status,
                }
            })
            .collect();

        Self {
            positions: PositionManager::new(config.trailing.clone()),
            writer: PersistenceWriter::spawn(store.clone()),
            config,
            candles,
            store,
            audit,
            ledger,
            portfolios,
            tick: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &ExecutionService {
        &self.ledger
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Seed missing portfolio metadata. For portfolios the store already
    /// knows, adopt the stored status, cash and open positions.
    pub async fn bootstrap(&mut self) {
        for runtime in &mut self.portfolios {
            match self.store.portfolio_meta(&runtime.id).await {
                Ok(Some(meta)) => {
                    tracing::info!(portfolio = %runtime.id, status = ?meta.status, "Loaded portfolio metadata");
                    runtime.status = meta.status;
                    let records = match self.store.open_positions(&runtime.id).await {
                        Ok(records) => records,
                        Err(e) => {
                            // Cash without its positions would understate equity
                            tracing::warn!(portfolio = %runtime.id, error = %e, "Failed to read open positions, starting from config");
                            continue;
                        }
                    };
                    let Some(state) = self.ledger.portfolio_mut(&runtime.id) else {
                        continue;
                    };
                    if meta.cash.is_finite() && meta.cash >= 0.0 {
                        state.cash = meta.cash;
                    }
                    if meta.starting_capital.is_finite() && meta.starting_capital > 0.0 {
                        state.starting_capital = meta.starting_capital;
                    }
                    for record in records {
                        if state.position(&record.symbol).is_none() {
                            state.positions.push(record.to_position());
                        }
                    }
                    tracing::info!(
                        portfolio = %runtime.id,
                        cash = state.cash,
                        open_positions = state.open_count(),
                        "Restored portfolio state"
                    );
                }
                Ok(None) => {
                    let Some(state) = self.ledger.portfolio(&runtime.id) else {
                        continue;
                    };
                    let meta = PortfolioMeta {
                        portfolio_id: runtime.id.clone(),
                        cash: state.cash,
                        starting_capital: state.starting_capital,
                        status: runtime.status,
                    };
                    if let Err(e) = self.store.upsert_portfolio_meta(meta).await {
                        tracing::warn!(portfolio = %runtime.id, error = %e, "Failed to seed portfolio metadata");
                    }
                }
                Err(e) => {
                    tracing::warn!(portfolio = %runtime.id, error = %e, "Failed to read portfolio metadata");
                }
            }
        }
    }

    /// Run one evaluation pass as of `now`. Always returns one decision per
    /// portfolio and symbol.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.tick += 1;
        let started = Instant::now();
        let mut report = TickReport::new(self.tick, now);
        let symbols = self.config.engine.symbols.clone();

        for idx in 0..self.portfolios.len() {
            let status = self.refresh_status(idx).await;
            let portfolio_id = self.portfolios[idx].id.clone();

            for symbol in &symbols {
                let scope = Scope {
                    tick: self.tick,
                    now,
                    portfolio: &portfolio_id,
                    symbol,
                };
                let decision = if status.is_active() {
                    let evaluated = AssertUnwindSafe(self.evaluate_symbol(idx, symbol, now, &mut report))
                        .catch_unwind()
                        .await;
                    match evaluated {
                        Ok(Ok(decision)) => decision,
                        Ok(Err(e)) => {
                            tracing::error!(portfolio = %portfolio_id, symbol = %symbol, error = %e, "Evaluation failed");
                            scope
                                .decide(Stage::Error, Action::Hold, "UNEXPECTED_ERROR")
                                .with_debug(json!({ "error": e.to_string() }))
                        }
                        Err(payload) => {
                            let message = panic_message(payload);
                            tracing::error!(portfolio = %portfolio_id, symbol = %symbol, panic = %message, "Evaluation panicked");
                            scope
                                .decide(Stage::Error, Action::Hold, "UNEXPECTED_ERROR")
                                .with_debug(json!({ "panic": message }))
                        }
                    }
                } else {
                    scope
                        .decide(Stage::Portfolio, Action::Hold, "PORTFOLIO_NOT_ACTIVE")
                        .with_debug(json!({ "status": status }))
                };

                self.audit.record(&decision);
                report.decisions.push(decision);
                self.flush_outbox();
            }

            if let Some(state) = self.ledger.portfolio(&portfolio_id) {
                publish_portfolio_metrics(state);
                report.equity.insert(portfolio_id.clone(), state.equity());
            }
        }

        metrics::counter!("engine_ticks_total").increment(1);
        metrics::histogram!("engine_tick_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(tick = self.tick, decisions = report.decisions.len(), "Tick complete");
        report
    }

    /// Wait for queued persistence writes, then stop the writer
    pub async fn shutdown(self) {
        self.writer.shutdown().await;
    }

    async fn refresh_status(&mut self, idx: usize) -> PortfolioStatus {
        let runtime = &mut self.portfolios[idx];
        match self.store.portfolio_meta(&runtime.id).await {
            Ok(Some(meta)) => runtime.status = meta.status,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    portfolio = %runtime.id,
                    error = %e,
                    fallback = ?runtime.status,
                    "Portfolio metadata read failed, using last known status"
                );
            }
        }
        runtime.status
    }

    fn flush_outbox(&mut self) {
        for request in self.ledger.drain_outbox() {
            self.writer.submit(request);
        }
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        self.candles
            .last_n_closed(symbol, timeframe, self.config.engine.lookback_bars, now)
            .await
    }

    async fn evaluate_symbol(
        &mut self,
        idx: usize,
        symbol: &str,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> anyhow::Result<Decision> {
        let portfolio_id = self.portfolios[idx].id.clone();
        let scope = Scope {
            tick: self.tick,
            now,
            portfolio: &portfolio_id,
            symbol,
        };
        let signal_tf = self.config.engine.signal_timeframe;
        let regime_tf = self.config.engine.regime_timeframe;

        let short = match self.fetch(symbol, signal_tf, now).await {
            Ok(window) => window,
            Err(e) => return Ok(fetch_failed(&scope, signal_tf, e)),
        };

        let has_position = self
            .ledger
            .portfolio(&portfolio_id)
            .ok_or_else(|| anyhow::anyhow!("portfolio {portfolio_id} missing from ledger"))?
            .position(symbol)
            .is_some();

        // Open positions only need the signal candle; regime data is for entries
        if has_position {
            let Some(candle) = short.latest() else {
                return Ok(scope.decide(Stage::PositionManagement, Action::Hold, "NO_CLOSED_CANDLE"));
            };
            let outcome = self.positions.manage(
                &mut self.ledger,
                &self.portfolios[idx].risk,
                &portfolio_id,
                symbol,
                candle,
                now,
            )?;
            return Ok(match outcome {
                ManageOutcome::AlreadyApplied { last_candle_at } => scope
                    .decide(Stage::PositionManagement, Action::Hold, "AWAITING_CANDLE")
                    .with_debug(json!({ "last_candle_at": last_candle_at })),
                ManageOutcome::Held(position) => scope
                    .decide(Stage::PositionManagement, Action::Hold, "POSITION_HELD")
                    .with_debug(json!({
                        "candle_at": candle.timestamp,
                        "close": candle.close,
                        "state": position.state(),
                        "entry_price": position.entry_price,
                        "stop_price": position.stop_price,
                        "take_profit_price": position.take_profit_price,
                        "trailing": position.trailing,
                        "unrealized_pnl": position.unrealized_pnl(),
                        "gap_detected": short.gap_detected,
                    })),
                ManageOutcome::Closed(trade) => {
                    let decision = scope
                        .decide(Stage::PositionManagement, Action::Sell, trade.exit_reason.code())
                        .with_debug(json!({
                            "candle_at": candle.timestamp,
                            "state": trade.state(),
                            "exit_fill": trade.exit_fill,
                            "entry_price": trade.position.entry_price,
                            "net_pnl": trade.net_pnl,
                        }));
                    report.closed.push((portfolio_id.clone(), *trade));
                    decision
                }
            });
        }

        let long = match self.fetch(symbol, regime_tf, now).await {
            Ok(window) => window,
            Err(e) => return Ok(fetch_failed(&scope, regime_tf, e)),
        };
        let state = self
            .ledger
            .portfolio(&portfolio_id)
            .ok_or_else(|| anyhow::anyhow!("portfolio {portfolio_id} missing from ledger"))?;

        if short.gap_detected || long.gap_detected {
            return Ok(scope
                .decide(Stage::MarketData, Action::Hold, "GAP_DETECTED")
                .with_debug(json!({
                    "signal_gap": short.gap_detected,
                    "regime_gap": long.gap_detected,
                })));
        }

        let risk = &self.portfolios[idx].risk;
        let snapshot = match risk.can_open_position(state, now) {
            Ok(snapshot) => snapshot,
            Err(block) => {
                return Ok(scope
                    .decide(Stage::RiskBlock, Action::Hold, block.code())
                    .with_debug(json!({ "detail": block.to_string(), "equity": state.equity() })));
            }
        };

        let indicators = compute_indicators(&short.closes(), &long.closes(), &self.config.indicators);
        if let Err(e) = &indicators {
            return Ok(scope
                .decide(Stage::Indicators, Action::Hold, e.code())
                .with_debug(json!({
                    "detail": e.to_string(),
                    "signal_bars": short.len(),
                    "regime_bars": long.len(),
                })));
        }

        let signal = evaluate_entry(&short.candles, &long.candles, &indicators, &self.config.signal);
        if !signal.is_buy() {
            return Ok(scope
                .decide(Stage::Signal, signal.action, signal.reason.code())
                .with_debug(json!({ "values": signal.values })));
        }

        let Some(latest) = short.latest() else {
            return Ok(scope.decide(Stage::Signal, Action::Hold, "MISSING_INPUT"));
        };
        let entry = latest.close;
        let stop = entry * (1.0 - self.config.execution.stop_loss_pct);
        let costs = risk.costs();
        let available = costs.spendable(state.cash) * (1.0 - CASH_HEADROOM);

        let size = match risk.compute_position_size(snapshot.equity, entry, stop, available) {
            Ok(size) => size,
            Err(e) => {
                return Ok(scope
                    .decide(Stage::Execution, Action::Hold, e.code())
                    .with_debug(json!({
                        "detail": e.to_string(),
                        "entry": entry,
                        "stop": stop,
                        "available_cash": available,
                    })));
            }
        };

        let request = OpenRequest {
            portfolio_id: portfolio_id.clone(),
            symbol: symbol.to_string(),
            reference_price: entry,
            stop_price: Some(stop),
            size,
            take_profit_r: self.config.execution.take_profit_r,
            require_stop_loss: risk.config().require_stop_loss,
            max_open_positions: risk.config().max_open_positions,
            costs,
            entry_candle_at: Some(latest.timestamp),
            now,
        };
        let opened = match self.ledger.open_position(request) {
            Ok(opened) => opened,
            Err(e) => {
                return Ok(scope
                    .decide(Stage::Execution, Action::Hold, e.code())
                    .with_debug(json!({ "detail": e.to_string(), "size": size, "entry": entry })));
            }
        };

        let decision = scope
            .decide(Stage::Execution, Action::Buy, "ORDER_FILLED")
            .with_debug(json!({
                "signal": signal.values,
                "risk": snapshot,
                "entry": entry,
                "stop_price": stop,
                "take_profit_price": opened.position.take_profit_price,
                "size": size,
                "fill": opened.fill,
                "cash_after": opened.cash_after,
            }));
        report.opened.push((portfolio_id.clone(), opened.fill));
        Ok(decision)
    }
}

fn fetch_failed(scope: &Scope<'_>, timeframe: Timeframe, error: anyhow::Error) -> Decision {
    tracing::warn!(
        portfolio = %scope.portfolio,
        symbol = %scope.symbol,
        %timeframe,
        error = %error,
        "Candle fetch failed"
    );
    scope
        .decide(Stage::MarketData, Action::Hold, "FETCH_FAILED")
        .with_debug(json!({ "timeframe": timeframe, "detail": error.to_string() }))
}

fn publish_portfolio_metrics(state: &PortfolioState) {
    metrics::gauge!("portfolio_equity", "portfolio" => state.id.clone()).set(state.equity());
    metrics::gauge!("portfolio_cash", "portfolio" => state.id.clone()).set(state.cash);
    metrics::gauge!("portfolio_open_positions", "portfolio" => state.id.clone())
        .set(state.open_count() as f64);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
