//! Entry signal evaluation
//!
//! Checks run in a fixed order and the first failure decides the reason.

use super::{SignalDecision, SignalReason, SignalValues};
use crate::audit::Action;
use crate::config::SignalConfig;
use crate::indicators::{IndicatorError, IndicatorSnapshot};
use crate::market::Candle;

fn hold(reason: SignalReason, values: SignalValues) -> SignalDecision {
    SignalDecision {
        action: Action::Hold,
        reason,
        values,
    }
}

fn candle_is_sane(candle: &Candle) -> bool {
    [candle.open, candle.high, candle.low, candle.close]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
}

fn config_is_sane(config: &SignalConfig) -> bool {
    config.pullback_pct.is_finite()
        && config.pullback_pct >= 0.0
        && config.rsi_min.is_finite()
        && config.rsi_max.is_finite()
        && config.rsi_min <= config.rsi_max
}

/// Evaluate the long entry on the latest closed candles.
///
/// `short` is the signal-timeframe window and `long` the regime-timeframe
/// window, both ascending. Pure and deterministic.
pub fn evaluate_entry(
    short: &[Candle],
    long: &[Candle],
    indicators: &Result<IndicatorSnapshot, IndicatorError>,
    config: &SignalConfig,
) -> SignalDecision {
    let mut values = SignalValues::default();

    let (short_last, long_last) = match (short.last(), long.last()) {
        (Some(s), Some(l)) if candle_is_sane(s) && candle_is_sane(l) && config_is_sane(config) => {
            (s, l)
        }
        _ => return hold(SignalReason::MissingInput, values),
    };
    values.short_open = Some(short_last.open);
    values.short_close = Some(short_last.close);
    values.long_close = Some(long_last.close);
    values.pullback_pct = Some(config.pullback_pct);
    values.rsi_min = Some(config.rsi_min);
    values.rsi_max = Some(config.rsi_max);

    let snap = match indicators {
        Ok(snap) => *snap,
        Err(_) => return hold(SignalReason::IndicatorsNotReady, values),
    };
    values.fast_ema = Some(snap.fast_ema);
    values.slow_ema = Some(snap.slow_ema);
    values.slow_ema_slope = Some(snap.slow_ema_slope);
    values.rsi = Some(snap.rsi);
    if !snap.is_finite() {
        return hold(SignalReason::IndicatorsNotReady, values);
    }

    if !(long_last.close > snap.slow_ema && snap.slow_ema_slope > 0.0) {
        return hold(SignalReason::RegimeFilterFail, values);
    }

    let distance = (short_last.close - snap.fast_ema).abs() / snap.fast_ema;
    values.pullback_distance = Some(distance);
    if !(distance <= config.pullback_pct) {
        return hold(SignalReason::PullbackFail, values);
    }

    if snap.rsi < config.rsi_min || snap.rsi > config.rsi_max {
        return hold(SignalReason::RsiFail, values);
    }

    if !short_last.is_green() {
        return hold(SignalReason::CandleNotGreen, values);
    }

    SignalDecision {
        action: Action::Buy,
        reason: SignalReason::EntryOk,
        values,
    }
}
