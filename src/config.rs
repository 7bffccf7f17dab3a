//! Configuration types for trend-pullback
//!
//! Every section has compiled defaults so a partial TOML file is valid.
//! [`Config::sanitized`] replaces any unsafe value with its default and
//! logs the field it rejected.

use crate::market::Timeframe;
use crate::persistence::PortfolioStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub indicators: IndicatorConfig,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub trailing: TrailingConfig,
    pub data: DataConfig,
    pub telemetry: TelemetryConfig,
    pub portfolios: Vec<PortfolioConfig>,
}

/// Evaluation loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between ticks of the live loop
    pub tick_interval_secs: u64,
    /// Entry trigger timeframe; also the unit of cooldown bars
    pub signal_timeframe: Timeframe,
    /// Trend regime timeframe
    pub regime_timeframe: Timeframe,
    /// Closed candles fetched per series per tick
    pub lookback_bars: usize,
    /// Symbols evaluated for every portfolio
    pub symbols: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            signal_timeframe: Timeframe::M15,
            regime_timeframe: Timeframe::H1,
            lookback_bars: 200,
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        }
    }
}

/// Indicator periods
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
    pub rsi_period: usize,
    /// Bars dropped from the long series to measure slow EMA slope
    pub slope_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fast_ema_period: 20,
            slow_ema_period: 50,
            rsi_period: 14,
            slope_lookback: 3,
        }
    }
}

/// Entry signal thresholds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Max |close - fastEMA| / fastEMA for a pullback entry
    pub pullback_pct: f64,
    pub rsi_min: f64,
    pub rsi_max: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            pullback_pct: 0.005,
            rsi_min: 40.0,
            rsi_max: 70.0,
        }
    }
}

/// What the daily limit gate measures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyLimitBasis {
    /// Net cash flow from fills today (buys negative, sells positive)
    #[default]
    NetFlow,
    /// Realized P&L of positions closed today
    RealizedPnl,
}

/// Risk management configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of equity risked between entry and stop
    pub risk_per_trade_pct: f64,
    pub max_open_positions: usize,
    /// Daily limit as a fraction of equity
    pub max_daily_net_outflow_pct: f64,
    /// Signal-timeframe bars to wait after a stop-loss exit
    pub cooldown_bars: u32,
    pub require_stop_loss: bool,
    pub daily_limit_basis: DailyLimitBasis,
    pub fee_bps: f64,
    pub slippage_bps: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: 0.005,
            max_open_positions: 3,
            max_daily_net_outflow_pct: 0.5,
            cooldown_bars: 4,
            require_stop_loss: true,
            daily_limit_basis: DailyLimitBasis::NetFlow,
            fee_bps: 10.0,
            slippage_bps: 5.0,
        }
    }
}

/// Per-portfolio risk overrides, merged onto the global [`RiskConfig`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskOverrides {
    pub risk_per_trade_pct: Option<f64>,
    pub max_open_positions: Option<usize>,
    pub max_daily_net_outflow_pct: Option<f64>,
    pub cooldown_bars: Option<u32>,
    pub require_stop_loss: Option<bool>,
    pub daily_limit_basis: Option<DailyLimitBasis>,
    pub fee_bps: Option<f64>,
    pub slippage_bps: Option<f64>,
}

/// Stop/target placement
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Stop distance below the latest close, as a fraction
    pub stop_loss_pct: f64,
    /// Take-profit distance as a multiple of entry-to-stop risk
    pub take_profit_r: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.01,
            take_profit_r: 2.0,
        }
    }
}

/// Trailing stop configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub enabled: bool,
    /// Gain over entry at which trailing activates
    pub activation_pct: f64,
    /// Distance of the trailing stop below the highest close
    pub gap_pct: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_pct: 0.01,
            gap_pct: 0.005,
        }
    }
}

/// Data locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory of `<SYMBOL>_<tf>.csv` candle files
    pub candle_dir: PathBuf,
    /// JSON-lines persistence file; in-memory only when unset
    pub store_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            candle_dir: PathBuf::from("./data"),
            store_path: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

/// One paper portfolio
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortfolioConfig {
    pub id: String,
    pub starting_cash: f64,
    #[serde(default)]
    pub status: PortfolioStatus,
    #[serde(default)]
    pub risk: RiskOverrides,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Replace unsafe values with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Config::default();

        if self.engine.tick_interval_secs == 0 {
            warn_field("engine.tick_interval_secs", &0, &defaults.engine.tick_interval_secs);
            self.engine.tick_interval_secs = defaults.engine.tick_interval_secs;
        }
        if self.engine.lookback_bars == 0 {
            warn_field("engine.lookback_bars", &0, &defaults.engine.lookback_bars);
            self.engine.lookback_bars = defaults.engine.lookback_bars;
        }

        self.indicators = self.indicators.sanitized();
        self.signal = self.signal.sanitized();
        self.risk = self.risk.sanitized();
        self.execution = self.execution.sanitized();
        self.trailing = self.trailing.sanitized();

        self.portfolios.retain(|p| {
            let ok = p.starting_cash.is_finite() && p.starting_cash > 0.0 && !p.id.is_empty();
            if !ok {
                tracing::warn!(portfolio = %p.id, cash = p.starting_cash, "Dropping portfolio with invalid starting cash");
            }
            ok
        });

        self
    }

    /// Effective risk config for one portfolio
    pub fn risk_for(&self, portfolio: &PortfolioConfig) -> RiskConfig {
        self.risk.with_overrides(&portfolio.risk)
    }
}

impl IndicatorConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let any_zero = self.fast_ema_period == 0
            || self.slow_ema_period == 0
            || self.rsi_period == 0
            || self.slope_lookback == 0;
        if any_zero || self.fast_ema_period >= self.slow_ema_period {
            tracing::warn!(config = ?self, fallback = ?defaults, "Invalid indicator periods, using defaults");
            return defaults;
        }
        self
    }
}

impl SignalConfig {
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.pullback_pct = pct("signal.pullback_pct", self.pullback_pct, defaults.pullback_pct);

        let band_ok = self.rsi_min.is_finite()
            && self.rsi_max.is_finite()
            && (0.0..=100.0).contains(&self.rsi_min)
            && (0.0..=100.0).contains(&self.rsi_max)
            && self.rsi_min <= self.rsi_max;
        if !band_ok {
            tracing::warn!(
                rsi_min = self.rsi_min,
                rsi_max = self.rsi_max,
                "Invalid RSI band, using defaults"
            );
            self.rsi_min = defaults.rsi_min;
            self.rsi_max = defaults.rsi_max;
        }
        self
    }
}

impl RiskConfig {
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        self.risk_per_trade_pct = pct("risk.risk_per_trade_pct", self.risk_per_trade_pct, d.risk_per_trade_pct);
        self.max_daily_net_outflow_pct = pct(
            "risk.max_daily_net_outflow_pct",
            self.max_daily_net_outflow_pct,
            d.max_daily_net_outflow_pct,
        );
        if self.max_open_positions == 0 {
            warn_field("risk.max_open_positions", &0, &d.max_open_positions);
            self.max_open_positions = d.max_open_positions;
        }
        self.fee_bps = bps("risk.fee_bps", self.fee_bps, d.fee_bps);
        self.slippage_bps = bps("risk.slippage_bps", self.slippage_bps, d.slippage_bps);
        self
    }

    /// Merge overrides field by field. An invalid override keeps the
    /// value from `self`.
    pub fn with_overrides(&self, o: &RiskOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(v) = o.risk_per_trade_pct {
            merged.risk_per_trade_pct = pct("risk_override.risk_per_trade_pct", v, self.risk_per_trade_pct);
        }
        if let Some(v) = o.max_open_positions {
            merged.max_open_positions = if v == 0 {
                warn_field("risk_override.max_open_positions", &v, &self.max_open_positions);
                self.max_open_positions
            } else {
                v
            };
        }
        if let Some(v) = o.max_daily_net_outflow_pct {
            merged.max_daily_net_outflow_pct = pct(
                "risk_override.max_daily_net_outflow_pct",
                v,
                self.max_daily_net_outflow_pct,
            );
        }
        if let Some(v) = o.cooldown_bars {
            merged.cooldown_bars = v;
        }
        if let Some(v) = o.require_stop_loss {
            merged.require_stop_loss = v;
        }
        if let Some(v) = o.daily_limit_basis {
            merged.daily_limit_basis = v;
        }
        if let Some(v) = o.fee_bps {
            merged.fee_bps = bps("risk_override.fee_bps", v, self.fee_bps);
        }
        if let Some(v) = o.slippage_bps {
            merged.slippage_bps = bps("risk_override.slippage_bps", v, self.slippage_bps);
        }
        merged
    }
}

impl ExecutionConfig {
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        self.stop_loss_pct = pct("execution.stop_loss_pct", self.stop_loss_pct, d.stop_loss_pct);
        if self.stop_loss_pct >= 1.0 {
            warn_field("execution.stop_loss_pct", &self.stop_loss_pct, &d.stop_loss_pct);
            self.stop_loss_pct = d.stop_loss_pct;
        }
        if !(self.take_profit_r.is_finite() && self.take_profit_r > 0.0) {
            warn_field("execution.take_profit_r", &self.take_profit_r, &d.take_profit_r);
            self.take_profit_r = d.take_profit_r;
        }
        self
    }
}

impl TrailingConfig {
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        self.activation_pct = pct("trailing.activation_pct", self.activation_pct, d.activation_pct);
        self.gap_pct = pct("trailing.gap_pct", self.gap_pct, d.gap_pct);
        if self.gap_pct >= 1.0 {
            warn_field("trailing.gap_pct", &self.gap_pct, &d.gap_pct);
            self.gap_pct = d.gap_pct;
        }
        self
    }
}

fn warn_field<T: std::fmt::Debug>(field: &str, value: &T, fallback: &T) {
    tracing::warn!(field, value = ?value, fallback = ?fallback, "Invalid config value, using fallback");
}

/// Fraction in (0, 1]
fn pct(field: &str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        value
    } else {
        warn_field(field, &value, &fallback);
        fallback
    }
}

/// Basis points in [0, 10000)
fn bps(field: &str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() && (0.0..10_000.0).contains(&value) {
        value
    } else {
        warn_field(field, &value, &fallback);
        fallback
    }
}
