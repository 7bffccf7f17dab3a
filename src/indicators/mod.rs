//! Indicator engine
//!
//! Pure numeric functions over close series. Nothing here reads a clock or
//! mutates state, so the live loop and replay compute identical values.

mod ema;
mod rsi;

pub use ema::ema;
pub use rsi::rsi;

use crate::config::IndicatorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Indicator values for one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Fast EMA on the signal timeframe
    pub fast_ema: f64,
    /// Slow EMA on the regime timeframe
    pub slow_ema: f64,
    /// slowEMA(full) - slowEMA(full minus lookback bars)
    pub slow_ema_slope: f64,
    /// RSI on the signal timeframe
    pub rsi: f64,
}

impl IndicatorSnapshot {
    pub fn is_finite(&self) -> bool {
        self.fast_ema.is_finite()
            && self.slow_ema.is_finite()
            && self.slow_ema_slope.is_finite()
            && self.rsi.is_finite()
    }
}

/// Indicator computation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    /// Config field is not a positive number
    #[error("Unsafe indicator input: {0}")]
    UnsafeInput(&'static str),
    /// Not enough closed candles
    #[error("Insufficient {series} data: have {have}, need {need}")]
    InsufficientData {
        series: &'static str,
        have: usize,
        need: usize,
    },
}

impl IndicatorError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            IndicatorError::UnsafeInput(_) => "UNSAFE_INPUT",
            IndicatorError::InsufficientData { .. } => "INSUFFICIENT_DATA",
        }
    }
}

/// Minimum closes needed on the signal timeframe
pub fn short_series_requirement(config: &IndicatorConfig) -> usize {
    config.fast_ema_period.max(config.rsi_period + 1)
}

/// Compute the snapshot from signal-timeframe (`short`) and
/// regime-timeframe (`long`) closes.
pub fn compute_indicators(
    short: &[f64],
    long: &[f64],
    config: &IndicatorConfig,
) -> Result<IndicatorSnapshot, IndicatorError> {
    if config.fast_ema_period == 0 {
        return Err(IndicatorError::UnsafeInput("fast_ema_period"));
    }
    if config.slow_ema_period == 0 {
        return Err(IndicatorError::UnsafeInput("slow_ema_period"));
    }
    if config.rsi_period == 0 {
        return Err(IndicatorError::UnsafeInput("rsi_period"));
    }
    if config.slope_lookback == 0 {
        return Err(IndicatorError::UnsafeInput("slope_lookback"));
    }

    let short_need = short_series_requirement(config);
    if short.len() < short_need {
        return Err(IndicatorError::InsufficientData {
            series: "short",
            have: short.len(),
            need: short_need,
        });
    }
    // The slope needs a full slow period after dropping the lookback bars
    let long_need = config.slow_ema_period + config.slope_lookback;
    if long.len() < long_need {
        return Err(IndicatorError::InsufficientData {
            series: "long",
            have: long.len(),
            need: long_need,
        });
    }

    let insufficient = |series, have, need| IndicatorError::InsufficientData { series, have, need };

    let fast_ema = ema(short, config.fast_ema_period)
        .ok_or_else(|| insufficient("short", short.len(), config.fast_ema_period))?;
    let rsi = rsi(short, config.rsi_period)
        .ok_or_else(|| insufficient("short", short.len(), config.rsi_period + 1))?;
    let slow_ema = ema(long, config.slow_ema_period)
        .ok_or_else(|| insufficient("long", long.len(), config.slow_ema_period))?;
    let truncated = &long[..long.len() - config.slope_lookback];
    let slow_ema_prev = ema(truncated, config.slow_ema_period)
        .ok_or_else(|| insufficient("long", long.len(), long_need))?;

    Ok(IndicatorSnapshot {
        fast_ema,
        slow_ema,
        slow_ema_slope: slow_ema - slow_ema_prev,
        rsi,
    })
}
