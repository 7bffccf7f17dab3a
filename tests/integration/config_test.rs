//! Configuration loading tests

use std::io::Write;
use trend_pullback::config::{Config, DailyLimitBasis, LogFormat};
use trend_pullback::market::Timeframe;
use trend_pullback::persistence::PortfolioStatus;

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    let config = config.sanitized();

    assert_eq!(config.engine.signal_timeframe, Timeframe::M15);
    assert_eq!(config.engine.regime_timeframe, Timeframe::H1);
    assert_eq!(config.risk.daily_limit_basis, DailyLimitBasis::NetFlow);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert_eq!(config.portfolios.len(), 2);

    let cautious = config.risk_for(&config.portfolios[1]);
    assert_eq!(cautious.max_open_positions, 1);
    assert_eq!(cautious.risk_per_trade_pct, 0.0025);
    assert_eq!(cautious.fee_bps, config.risk.fee_bps);
}

#[test]
fn test_load_sanitizes_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [engine]
        tick_interval_secs = 0

        [signal]
        pullback_pct = -1.0
        rsi_min = 90.0
        rsi_max = 10.0

        [execution]
        take_profit_r = 0.0

        [trailing]
        gap_pct = 1.5

        [[portfolios]]
        id = "main"
        starting_cash = 1000.0
        status = "closed"
        [portfolios.risk]
        max_daily_net_outflow_pct = 3.0

        [[portfolios]]
        id = "empty"
        starting_cash = -5.0
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    let defaults = Config::default();

    assert_eq!(config.engine.tick_interval_secs, defaults.engine.tick_interval_secs);
    assert_eq!(config.signal, defaults.signal);
    assert_eq!(config.execution.take_profit_r, defaults.execution.take_profit_r);
    assert_eq!(config.trailing.gap_pct, defaults.trailing.gap_pct);

    assert_eq!(config.portfolios.len(), 1);
    assert_eq!(config.portfolios[0].status, PortfolioStatus::Closed);
    let risk = config.risk_for(&config.portfolios[0]);
    assert_eq!(risk.max_daily_net_outflow_pct, defaults.risk.max_daily_net_outflow_pct);
}

#[test]
fn test_load_rejects_malformed_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine\nsymbols = 3").unwrap();
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn test_config_roundtrips_through_toml() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed: Config = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed.portfolios.len(), config.portfolios.len());
    assert_eq!(reparsed.risk, config.risk);
}
