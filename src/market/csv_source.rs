//! CSV-file candle source
//!
//! One file per series, `<dir>/<SYMBOL>_<timeframe>.csv`, with a header row
//! `timestamp,open,high,low,close,volume` and epoch-millisecond timestamps.
//! Files are re-read on every fetch so an external ingester can append rows
//! between ticks.

use super::{Candle, CandleSource, CandleWindow, Timeframe};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Candle source backed by a directory of CSV files
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding one series
    pub fn series_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_uppercase(), timeframe))
    }
}

/// Parse CSV bytes into candles for one series.
///
/// Unreadable rows are skipped with a warning. A half-appended last line
/// from an ingester must not hide the rows before it.
pub fn parse_candles(bytes: &[u8], symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut candles = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(symbol, %timeframe, row = line + 2, error = %e, "Skipping unreadable candle row");
                continue;
            }
        };
        let Some(timestamp) = Utc.timestamp_millis_opt(row.timestamp).single() else {
            tracing::warn!(symbol, %timeframe, row = line + 2, timestamp = row.timestamp, "Skipping candle row with bad timestamp");
            continue;
        };
        candles.push(Candle {
            symbol: symbol.to_string(),
            timeframe,
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    candles
}

/// Load a whole CSV file for one series
pub async fn load_file(path: &Path, symbol: &str, timeframe: Timeframe) -> anyhow::Result<Vec<Candle>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_candles(&bytes, symbol, timeframe))
}

#[async_trait]
impl CandleSource for CsvCandleSource {
    async fn last_n_closed(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        n: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CandleWindow> {
        let path = self.series_path(symbol, timeframe);
        let candles = load_file(&path, symbol, timeframe).await?;
        Ok(CandleWindow::closed(candles, timeframe, n, now))
    }
}
