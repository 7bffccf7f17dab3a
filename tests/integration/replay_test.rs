//! Replay harness integration tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use trend_pullback::audit::Stage;
use trend_pullback::backtest::ReplayRunner;
use trend_pullback::config::{Config, IndicatorConfig, PortfolioConfig, SignalConfig};
use trend_pullback::market::{Candle, MemoryCandleSource, Timeframe};
use trend_pullback::persistence::PortfolioStatus;
use trend_pullback::position::ExitReason;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
}

fn candle(tf: Timeframe, i: i64, close: f64) -> Candle {
    let open = close - 0.05;
    Candle {
        symbol: "BTCUSDT".to_string(),
        timeframe: tf,
        timestamp: t0() + tf.duration() * i as i32,
        open,
        high: close + 0.05,
        low: open - 0.05,
        close,
        volume: 1.0,
    }
}

/// One trending day: 96 signal bars and 24 regime bars
fn trending_day() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..96)
        .map(|i| candle(Timeframe::M15, i, 100.0 + 0.1 * i as f64))
        .collect();
    candles.extend((0..24).map(|h| candle(Timeframe::H1, h, 100.0 + 0.4 * h as f64)));
    candles
}

fn config() -> Config {
    let mut config = Config::default();
    config.engine.symbols = vec!["BTCUSDT".to_string()];
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

#[test]
fn test_span_covers_signal_closes() {
    let candles = trending_day();
    let (start, end) = ReplayRunner::span(&candles, Timeframe::M15).unwrap();
    assert_eq!(start, t0() + Duration::minutes(15) + Duration::milliseconds(1));
    assert_eq!(end, t0() + Duration::hours(24) + Duration::milliseconds(1));
    assert!(ReplayRunner::span(&[], Timeframe::M15).is_none());
}

#[tokio::test]
async fn test_replay_trending_day() {
    let candles = trending_day();
    let (start, end) = ReplayRunner::span(&candles, Timeframe::M15).unwrap();
    let source = Arc::new(MemoryCandleSource::from_candles(candles));

    let result = ReplayRunner::new(config(), source).run(start, end).await.unwrap();

    assert_eq!(result.ticks, 96);
    // One decision per tick for the single portfolio and symbol
    assert_eq!(result.decisions.len(), 96);
    assert_eq!(result.decisions[0].stage, Stage::Indicators);
    assert!(result.decisions.iter().any(|d| d.reason == "ORDER_FILLED"));

    let trades = &result.trades["alpha"];
    assert!(!trades.is_empty());
    assert!(trades.iter().all(|t| t.exit_reason == ExitReason::TakeProfit));
    assert!(trades.iter().all(|t| t.net_pnl > 0.0));

    let summary = &result.summaries["alpha"];
    assert_eq!(summary.total_trades, trades.len());
    assert!(summary.net_pnl > 0.0);
    assert_eq!(summary.win_rate, 1.0);
    assert_eq!(result.equity_curves["alpha"].len(), 96);
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let candles = trending_day();
    let (start, end) = ReplayRunner::span(&candles, Timeframe::M15).unwrap();
    let source = Arc::new(MemoryCandleSource::from_candles(candles));
    let runner = ReplayRunner::new(config(), source);

    let first = runner.run(start, end).await.unwrap();
    let second = runner.run(start, end).await.unwrap();

    let reasons = |r: &trend_pullback::backtest::ReplayResult| {
        r.decisions
            .iter()
            .map(|d| (d.tick, d.stage, d.reason.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(reasons(&first), reasons(&second));
    assert_eq!(first.equity_curves, second.equity_curves);
    assert_eq!(first.summaries["alpha"].net_pnl, second.summaries["alpha"].net_pnl);
}

#[tokio::test]
async fn test_replay_rejects_inverted_range() {
    let source = Arc::new(MemoryCandleSource::new());
    let result = ReplayRunner::new(config(), source)
        .run(t0() + Duration::hours(1), t0())
        .await;
    assert!(result.is_err());
}
