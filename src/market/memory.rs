//! In-memory candle source

use super::{Candle, CandleSource, CandleWindow, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Candle store keyed by (symbol, timeframe), used by replay and tests
#[derive(Default)]
pub struct MemoryCandleSource {
    series: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
}

impl MemoryCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from a flat candle list
    pub fn from_candles(candles: impl IntoIterator<Item = Candle>) -> Self {
        let mut series: HashMap<(String, Timeframe), Vec<Candle>> = HashMap::new();
        for candle in candles {
            series
                .entry((candle.symbol.clone(), candle.timeframe))
                .or_default()
                .push(candle);
        }
        Self {
            series: RwLock::new(series),
        }
    }

    /// Append candles to the store
    pub async fn extend(&self, candles: impl IntoIterator<Item = Candle>) {
        let mut series = self.series.write().await;
        for candle in candles {
            series
                .entry((candle.symbol.clone(), candle.timeframe))
                .or_default()
                .push(candle);
        }
    }

    /// All stored candles for one series, unsorted
    pub async fn series(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        let series = self.series.read().await;
        series
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CandleSource for MemoryCandleSource {
    async fn last_n_closed(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        n: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        let series = self.series.read().await;
        let candles = series
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        Ok(CandleWindow::closed(candles, timeframe, n, now))
    }
}
