//! Closed-candle windows with gap detection

use super::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Interior deltas larger than this multiple of the timeframe count as a gap
const GAP_TOLERANCE: f64 = 1.5;

/// Ascending, deduplicated, closed candles plus a gap flag
#[derive(Debug, Clone, Default)]
pub struct CandleWindow {
    pub candles: Vec<Candle>,
    pub gap_detected: bool,
}

impl CandleWindow {
    /// Build a window of at most `n` closed candles as of `now`.
    ///
    /// Input order does not matter. Duplicate timestamps keep the last
    /// candle seen, in-progress candles are dropped.
    pub fn closed(
        candles: impl IntoIterator<Item = Candle>,
        timeframe: Timeframe,
        n: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let mut by_ts: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
        for candle in candles {
            if candle.timeframe != timeframe || !candle.is_closed_at(now) {
                continue;
            }
            by_ts.insert(candle.timestamp, candle);
        }

        let skip = by_ts.len().saturating_sub(n);
        let candles: Vec<Candle> = by_ts.into_values().skip(skip).collect();
        let gap_detected = has_gap(&candles, timeframe);

        Self {
            candles,
            gap_detected,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

/// True when any consecutive timestamp delta exceeds 1.5x the timeframe
pub fn has_gap(candles: &[Candle], timeframe: Timeframe) -> bool {
    let limit = timeframe.duration_ms() as f64 * GAP_TOLERANCE;
    candles.windows(2).any(|pair| {
        let delta = (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64;
        delta > limit
    })
}
