//! Signal types

use crate::audit::Action;
use serde::{Deserialize, Serialize};

/// Why the evaluator decided what it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalReason {
    /// Candles or config absent or malformed
    MissingInput,
    /// Indicator snapshot failed or holds a non-finite value
    IndicatorsNotReady,
    /// Regime close not above slow EMA, or slow EMA not rising
    RegimeFilterFail,
    /// Close too far from the fast EMA
    PullbackFail,
    /// RSI outside the configured band
    RsiFail,
    /// Signal candle did not close above its open
    CandleNotGreen,
    EntryOk,
}

impl SignalReason {
    /// Stable reason code
    pub fn code(self) -> &'static str {
        match self {
            SignalReason::MissingInput => "MISSING_INPUT",
            SignalReason::IndicatorsNotReady => "INDICATORS_NOT_READY",
            SignalReason::RegimeFilterFail => "REGIME_FILTER_FAIL",
            SignalReason::PullbackFail => "PULLBACK_FAIL",
            SignalReason::RsiFail => "RSI_FAIL",
            SignalReason::CandleNotGreen => "CANDLE_NOT_GREEN",
            SignalReason::EntryOk => "ENTRY_OK",
        }
    }
}

/// Intermediate values kept for audit. Absent when the check that
/// produces them never ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalValues {
    pub short_open: Option<f64>,
    pub short_close: Option<f64>,
    pub long_close: Option<f64>,
    pub fast_ema: Option<f64>,
    pub slow_ema: Option<f64>,
    pub slow_ema_slope: Option<f64>,
    pub rsi: Option<f64>,
    /// |short_close - fast_ema| / fast_ema
    pub pullback_distance: Option<f64>,
    pub pullback_pct: Option<f64>,
    pub rsi_min: Option<f64>,
    pub rsi_max: Option<f64>,
}

/// Result of evaluating the entry signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub action: Action,
    pub reason: SignalReason,
    pub values: SignalValues,
}

impl SignalDecision {
    pub fn is_buy(&self) -> bool {
        self.action == Action::Buy
    }
}
