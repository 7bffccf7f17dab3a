//! Market data module
//!
//! Closed candles on the signal and regime timeframes, behind a pluggable
//! source so the live loop and the replay harness read data the same way.

mod csv_source;
mod memory;
mod types;
mod window;

pub use csv_source::{load_file, parse_candles, CsvCandleSource};
pub use memory::MemoryCandleSource;
pub use types::{Candle, Timeframe};
pub use window::{has_gap, CandleWindow};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for candle source implementations
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Last `n` closed candles as of `now`, ascending, with a gap flag
    async fn last_n_closed(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        n: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow>;

    /// Most recent closed candle as of `now`
    async fn latest_closed(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Candle>> {
        let window = self.last_n_closed(symbol, timeframe, 1, now).await?;
        Ok(window.candles.into_iter().last())
    }
}
