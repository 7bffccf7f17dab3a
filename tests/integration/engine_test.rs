//! Engine integration tests: one tick across portfolios and symbols

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use trend_pullback::audit::{Action, MemoryAuditSink, Stage};
use trend_pullback::config::{Config, IndicatorConfig, PortfolioConfig, SignalConfig};
use trend_pullback::engine::{Engine, ManualClock, Scheduler};
use trend_pullback::market::{
    Candle, CandleSource, CandleWindow, CsvCandleSource, MemoryCandleSource, Timeframe,
};
use trend_pullback::persistence::{
    JsonlStore, MemoryStore, OrderRecord, PersistenceStore, PortfolioMeta, PortfolioStatus,
    PositionRecord, PositionStatus,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Just after signal bar `k` has opened, so bars before it are closed
fn at_bar(k: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(15 * k) + Duration::milliseconds(1)
}

fn signal_candle(symbol: &str, i: i64) -> Candle {
    let close = 100.0 + 0.1 * i as f64;
    let open = close - 0.05;
    Candle {
        symbol: symbol.to_string(),
        timeframe: Timeframe::M15,
        timestamp: t0() + Duration::minutes(15 * i),
        open,
        high: close + 0.05,
        low: open - 0.05,
        close,
        volume: 1.0,
    }
}

fn regime_candle(symbol: &str, h: i64, step: f64) -> Candle {
    let close = 100.0 + step * h as f64;
    Candle {
        symbol: symbol.to_string(),
        timeframe: Timeframe::H1,
        timestamp: t0() + Duration::hours(h),
        open: close - step / 2.0,
        high: close.max(close - step / 2.0) + 0.1,
        low: close.min(close - step / 2.0) - 0.1,
        close,
        volume: 1.0,
    }
}

/// Steadily rising market: every entry check passes once enough bars close
fn bullish(symbol: &str, signal_bars: i64, regime_bars: i64) -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..signal_bars).map(|i| signal_candle(symbol, i)).collect();
    candles.extend((0..regime_bars).map(|h| regime_candle(symbol, h, 0.4)));
    candles
}

fn config(symbols: &[&str]) -> Config {
    let mut config = Config::default();
    config.engine.symbols = symbols.iter().map(|s| s.to_string()).collect();
    config.engine.lookback_bars = 50;
    config.indicators = IndicatorConfig {
        fast_ema_period: 3,
        slow_ema_period: 5,
        rsi_period: 3,
        slope_lookback: 2,
    };
    config.signal = SignalConfig {
        pullback_pct: 0.005,
        rsi_min: 50.0,
        rsi_max: 100.0,
    };
    config.portfolios = vec![PortfolioConfig {
        id: "alpha".to_string(),
        starting_cash: 10_000.0,
        status: PortfolioStatus::Active,
        risk: Default::default(),
    }];
    config
}

struct Harness {
    engine: Engine,
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAuditSink>,
}

async fn harness(config: Config, source: Arc<dyn CandleSource>) -> Harness {
    harness_with_store(config, source, Arc::new(MemoryStore::new())).await
}

async fn harness_with_store(
    config: Config,
    source: Arc<dyn CandleSource>,
    store: Arc<MemoryStore>,
) -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let mut engine = Engine::new(config, source, store.clone(), audit.clone());
    engine.bootstrap().await;
    Harness {
        engine,
        store,
        audit,
    }
}

#[tokio::test]
async fn test_bullish_tick_opens_position() {
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));
    let mut h = harness(config(&["BTCUSDT"]), source).await;

    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions.len(), 1);
    let decision = &report.decisions[0];
    assert_eq!(decision.stage, Stage::Execution);
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.reason, "ORDER_FILLED");
    assert!(decision.debug["risk"]["equity"].as_f64().is_some());

    let state = h.engine.ledger().portfolio("alpha").unwrap();
    let position = state.position("BTCUSDT").unwrap();
    assert!((position.reference_price - 103.9).abs() < 1e-9);
    assert!((position.stop_price.unwrap() - 103.9 * 0.99).abs() < 1e-9);
    // 0.5% of 10k risked over a 1% stop
    assert!((position.size - 50.0 / (103.9 * 0.01)).abs() < 1e-6);
    assert!(state.cash < 10_000.0);

    let equity = report.equity["alpha"];
    assert!((equity - (state.cash + position.size * 103.9)).abs() < 1e-6);
    assert_eq!(h.audit.decisions().len(), 1);

    h.engine.shutdown().await;
    let positions = h.store.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].status, PositionStatus::Open);
    assert_eq!(h.store.orders().await.len(), 1);
}

#[tokio::test]
async fn test_open_position_routes_to_management() {
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 42, 12)));
    let mut h = harness(config(&["BTCUSDT"]), source).await;

    h.engine.tick(at_bar(40)).await;
    let report = h.engine.tick(at_bar(41)).await;
    assert_eq!(report.decisions[0].stage, Stage::PositionManagement);
    assert_eq!(report.decisions[0].reason, "POSITION_HELD");

    // Same closed candle again: nothing new to apply
    let report = h.engine.tick(at_bar(41)).await;
    assert_eq!(report.decisions[0].reason, "AWAITING_CANDLE");
    assert_eq!(h.engine.ledger().portfolio("alpha").unwrap().open_count(), 1);
}

#[tokio::test]
async fn test_stop_out_then_cooldown() {
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 12)));
    let mut h = harness(config(&["BTCUSDT"]), source.clone()).await;

    h.engine.tick(at_bar(40)).await;
    source
        .extend([Candle {
            open: 103.95,
            high: 104.0,
            low: 100.0,
            close: 100.5,
            ..signal_candle("BTCUSDT", 40)
        }])
        .await;

    let stop_at = at_bar(41);
    let report = h.engine.tick(stop_at).await;
    let decision = &report.decisions[0];
    assert_eq!(decision.stage, Stage::PositionManagement);
    assert_eq!(decision.action, Action::Sell);
    assert_eq!(decision.reason, "STOP");
    assert_eq!(report.closed.len(), 1);
    let (portfolio, trade) = &report.closed[0];
    assert_eq!(portfolio, "alpha");
    assert!(trade.net_pnl < 0.0);

    let state = h.engine.ledger().portfolio("alpha").unwrap();
    assert_eq!(state.open_count(), 0);
    assert_eq!(state.last_stop_out_at, Some(stop_at));

    let report = h.engine.tick(at_bar(42)).await;
    assert_eq!(report.decisions[0].stage, Stage::RiskBlock);
    assert_eq!(report.decisions[0].reason, "COOLDOWN");

    h.engine.shutdown().await;
    let closed = h
        .store
        .positions()
        .await
        .into_iter()
        .filter(|p| p.status == PositionStatus::Closed)
        .count();
    assert_eq!(closed, 1);
    assert_eq!(h.store.orders().await.len(), 2);
}

#[tokio::test]
async fn test_max_positions_blocks_second_symbol() {
    let mut candles = bullish("AAAUSDT", 40, 10);
    candles.extend(bullish("BBBUSDT", 40, 10));
    let source = Arc::new(MemoryCandleSource::from_candles(candles));
    let mut config = config(&["AAAUSDT", "BBBUSDT"]);
    config.risk.max_open_positions = 1;
    let mut h = harness(config, source).await;

    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].reason, "ORDER_FILLED");
    assert_eq!(report.decisions[1].stage, Stage::RiskBlock);
    assert_eq!(report.decisions[1].reason, "MAX_POSITIONS");
    assert_eq!(h.engine.ledger().portfolio("alpha").unwrap().open_count(), 1);
}

#[tokio::test]
async fn test_paused_portfolio_short_circuits() {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_portfolio_meta(PortfolioMeta {
            portfolio_id: "alpha".into(),
            cash: 10_000.0,
            starting_capital: 10_000.0,
            status: PortfolioStatus::Paused,
        })
        .await
        .unwrap();
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));
    let mut h = harness_with_store(config(&["BTCUSDT"]), source, store).await;

    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].stage, Stage::Portfolio);
    assert_eq!(report.decisions[0].reason, "PORTFOLIO_NOT_ACTIVE");
    assert_eq!(h.engine.ledger().portfolio("alpha").unwrap().cash, 10_000.0);
}

#[tokio::test]
async fn test_gap_blocks_entry() {
    let candles: Vec<Candle> = bullish("BTCUSDT", 40, 10)
        .into_iter()
        .filter(|c| !(c.timeframe == Timeframe::M15 && c.timestamp == t0() + Duration::minutes(15 * 30)))
        .collect();
    let source = Arc::new(MemoryCandleSource::from_candles(candles));
    let mut h = harness(config(&["BTCUSDT"]), source).await;

    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].stage, Stage::MarketData);
    assert_eq!(report.decisions[0].reason, "GAP_DETECTED");
    assert_eq!(report.decisions[0].debug["signal_gap"], true);
}

#[tokio::test]
async fn test_warmup_reports_insufficient_data() {
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));
    let mut h = harness(config(&["BTCUSDT"]), source).await;

    let report = h.engine.tick(at_bar(8)).await;
    assert_eq!(report.decisions[0].stage, Stage::Indicators);
    assert_eq!(report.decisions[0].reason, "INSUFFICIENT_DATA");
}

#[tokio::test]
async fn test_falling_regime_holds_on_signal() {
    let mut candles: Vec<Candle> = (0..40).map(|i| signal_candle("BTCUSDT", i)).collect();
    candles.extend((0..10).map(|h| regime_candle("BTCUSDT", h, -0.4)));
    let source = Arc::new(MemoryCandleSource::from_candles(candles));
    let mut h = harness(config(&["BTCUSDT"]), source).await;

    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].stage, Stage::Signal);
    assert_eq!(report.decisions[0].action, Action::Hold);
    assert_eq!(report.decisions[0].reason, "REGIME_FILTER_FAIL");
    assert!(report.decisions[0].debug["values"]["slow_ema"].as_f64().is_some());
}

struct FailingSource;

#[async_trait]
impl CandleSource for FailingSource {
    async fn last_n_closed(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _n: usize,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        anyhow::bail!("exchange unreachable")
    }
}

struct PanickingSource;

#[async_trait]
impl CandleSource for PanickingSource {
    async fn last_n_closed(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _n: usize,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        panic!("corrupt candle cache")
    }
}

#[tokio::test]
async fn test_fetch_failure_is_recorded() {
    let mut h = harness(config(&["BTCUSDT"]), Arc::new(FailingSource)).await;
    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].stage, Stage::MarketData);
    assert_eq!(report.decisions[0].reason, "FETCH_FAILED");
}

/// Signal data keeps flowing while the regime feed can be switched off
struct RegimeOutageSource {
    inner: MemoryCandleSource,
    regime_down: AtomicBool,
}

#[async_trait]
impl CandleSource for RegimeOutageSource {
    async fn last_n_closed(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        n: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        if timeframe == Timeframe::H1 && self.regime_down.load(Ordering::SeqCst) {
            anyhow::bail!("regime feed down");
        }
        self.inner.last_n_closed(symbol, timeframe, n, now).await
    }
}

#[tokio::test]
async fn test_stop_managed_while_regime_feed_down() {
    let source = Arc::new(RegimeOutageSource {
        inner: MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 12)),
        regime_down: AtomicBool::new(false),
    });
    let mut h = harness(config(&["BTCUSDT"]), source.clone()).await;
    assert_eq!(h.engine.tick(at_bar(40)).await.decisions[0].reason, "ORDER_FILLED");

    source.regime_down.store(true, Ordering::SeqCst);
    source
        .inner
        .extend([Candle {
            open: 103.95,
            high: 104.0,
            low: 50.0,
            close: 51.0,
            ..signal_candle("BTCUSDT", 40)
        }])
        .await;

    let report = h.engine.tick(at_bar(41)).await;
    let decision = &report.decisions[0];
    assert_eq!(decision.stage, Stage::PositionManagement);
    assert_eq!(decision.action, Action::Sell);
    assert_eq!(decision.reason, "STOP");
    assert_eq!(h.engine.ledger().portfolio("alpha").unwrap().open_count(), 0);

    // Flat again: entries still need the regime series
    let report = h.engine.tick(at_bar(42)).await;
    assert_eq!(report.decisions[0].stage, Stage::MarketData);
    assert_eq!(report.decisions[0].reason, "FETCH_FAILED");
    assert_eq!(report.decisions[0].debug["timeframe"], "1h");
}

#[tokio::test]
async fn test_external_pause_reaches_running_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.jsonl");
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));
    let store = Arc::new(JsonlStore::open(&path).await.unwrap());
    let mut engine = Engine::new(
        config(&["BTCUSDT"]),
        source,
        store,
        Arc::new(MemoryAuditSink::new()),
    );
    engine.bootstrap().await;

    let operator = JsonlStore::open(&path).await.unwrap();
    let mut meta = operator.portfolio_meta("alpha").await.unwrap().unwrap();
    meta.status = PortfolioStatus::Paused;
    operator.upsert_portfolio_meta(meta).await.unwrap();

    let report = engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].stage, Stage::Portfolio);
    assert_eq!(report.decisions[0].reason, "PORTFOLIO_NOT_ACTIVE");
    assert_eq!(engine.ledger().portfolio("alpha").unwrap().open_count(), 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_restart_restores_cash_and_positions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.jsonl");
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));

    let mut first = Engine::new(
        config(&["BTCUSDT"]),
        source.clone(),
        Arc::new(JsonlStore::open(&path).await.unwrap()),
        Arc::new(MemoryAuditSink::new()),
    );
    first.bootstrap().await;
    assert_eq!(first.tick(at_bar(40)).await.decisions[0].reason, "ORDER_FILLED");
    let before = first.ledger().portfolio("alpha").unwrap().clone();
    first.shutdown().await;

    let stored = JsonlStore::open(&path).await.unwrap();
    let meta = stored.portfolio_meta("alpha").await.unwrap().unwrap();
    assert!((meta.cash - before.cash).abs() < 1e-9);
    assert_eq!(meta.status, PortfolioStatus::Active);

    let mut second = Engine::new(
        config(&["BTCUSDT"]),
        source,
        Arc::new(stored),
        Arc::new(MemoryAuditSink::new()),
    );
    second.bootstrap().await;
    let after = second.ledger().portfolio("alpha").unwrap();
    assert!((after.cash - before.cash).abs() < 1e-9);
    assert_eq!(after.positions.len(), 1);
    let (restored, original) = (&after.positions[0], &before.positions[0]);
    assert_eq!(restored.id, original.id);
    assert_eq!(restored.last_candle_at, original.last_candle_at);
    assert!((restored.size - original.size).abs() < 1e-9);
    assert!((restored.stop_price.unwrap() - original.stop_price.unwrap()).abs() < 1e-9);

    // The entry candle was already applied before the restart
    let report = second.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].stage, Stage::PositionManagement);
    assert_eq!(report.decisions[0].reason, "AWAITING_CANDLE");
    second.shutdown().await;
}

#[tokio::test]
async fn test_panic_becomes_error_decision() {
    let mut h = harness(config(&["BTCUSDT", "ETHUSDT"]), Arc::new(PanickingSource)).await;
    let report = h.engine.tick(at_bar(40)).await;

    assert_eq!(report.decisions.len(), 2);
    for decision in &report.decisions {
        assert_eq!(decision.stage, Stage::Error);
        assert_eq!(decision.reason, "UNEXPECTED_ERROR");
        assert_eq!(decision.debug["panic"], "corrupt candle cache");
    }
    assert_eq!(h.audit.decisions().len(), 2);
}

/// Store whose metadata reads always fail
struct FlakyMetaStore {
    inner: MemoryStore,
}

#[async_trait]
impl PersistenceStore for FlakyMetaStore {
    async fn upsert_position(&self, record: PositionRecord) -> anyhow::Result<()> {
        self.inner.upsert_position(record).await
    }
    async fn upsert_order(&self, record: OrderRecord) -> anyhow::Result<()> {
        self.inner.upsert_order(record).await
    }
    async fn portfolio_meta(&self, _portfolio_id: &str) -> anyhow::Result<Option<PortfolioMeta>> {
        anyhow::bail!("connection reset")
    }
    async fn upsert_portfolio_meta(&self, meta: PortfolioMeta) -> anyhow::Result<()> {
        self.inner.upsert_portfolio_meta(meta).await
    }
    async fn update_portfolio_cash(&self, portfolio_id: &str, cash: f64) -> anyhow::Result<()> {
        self.inner.update_portfolio_cash(portfolio_id, cash).await
    }
    async fn open_positions(&self, portfolio_id: &str) -> anyhow::Result<Vec<PositionRecord>> {
        self.inner.open_positions(portfolio_id).await
    }
}

#[tokio::test]
async fn test_meta_read_failure_uses_last_known_status() {
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));
    let store = Arc::new(FlakyMetaStore {
        inner: MemoryStore::new(),
    });
    let audit = Arc::new(MemoryAuditSink::new());
    let mut engine = Engine::new(config(&["BTCUSDT"]), source, store, audit);
    engine.bootstrap().await;

    let report = engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].reason, "ORDER_FILLED");
    engine.shutdown().await;
}

#[tokio::test]
async fn test_csv_source_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CsvCandleSource::new(dir.path());
    for tf in [Timeframe::M15, Timeframe::H1] {
        let mut body = String::from("timestamp,open,high,low,close,volume\n");
        for c in bullish("BTCUSDT", 40, 10).iter().filter(|c| c.timeframe == tf) {
            body.push_str(&format!(
                "{},{},{},{},{},{}\n",
                c.timestamp.timestamp_millis(),
                c.open,
                c.high,
                c.low,
                c.close,
                c.volume
            ));
        }
        std::fs::write(layout.series_path("BTCUSDT", tf), body).unwrap();
    }

    let mut h = harness(config(&["BTCUSDT"]), Arc::new(layout)).await;
    let report = h.engine.tick(at_bar(40)).await;
    assert_eq!(report.decisions[0].reason, "ORDER_FILLED");
}

#[tokio::test]
async fn test_scheduler_skips_when_busy() {
    let source = Arc::new(MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)));
    let h = harness(config(&["BTCUSDT"]), source).await;
    let engine = Arc::new(Mutex::new(h.engine));
    let scheduler = Scheduler::new(
        engine.clone(),
        Arc::new(ManualClock::new(at_bar(40))),
        std::time::Duration::from_secs(60),
    );

    {
        let _busy = engine.lock().await;
        assert!(scheduler.trigger().await.is_none());
    }
    assert_eq!(scheduler.skipped(), 1);

    let report = scheduler.trigger().await.unwrap();
    assert_eq!(report.tick, 1);
}

/// Source that takes a while to answer
struct SlowSource {
    inner: MemoryCandleSource,
}

#[async_trait]
impl CandleSource for SlowSource {
    async fn last_n_closed(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        n: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        self.inner.last_n_closed(symbol, timeframe, n, now).await
    }
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_tick_finish() {
    let source = Arc::new(SlowSource {
        inner: MemoryCandleSource::from_candles(bullish("BTCUSDT", 40, 10)),
    });
    let h = harness(config(&["BTCUSDT"]), source).await;
    let audit = h.audit.clone();
    let engine = Arc::new(Mutex::new(h.engine));
    let scheduler = Arc::new(Scheduler::new(
        engine.clone(),
        Arc::new(ManualClock::new(at_bar(40))),
        std::time::Duration::from_secs(3_600),
    ));

    let (tx, rx) = watch::channel(false);
    let running = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(rx).await })
    };

    // The first interval tick fires immediately; stop while it is fetching
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    running.await.unwrap();

    assert_eq!(engine.lock().await.tick_count(), 1);
    let decisions = audit.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].reason, "ORDER_FILLED");
}
