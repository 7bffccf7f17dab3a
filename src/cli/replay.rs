//! Replay command implementation

use crate::backtest::ReplayRunner;
use crate::config::Config;
use crate::market::{load_file, CsvCandleSource, MemoryCandleSource};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Candle CSV directory, overrides `data.candle_dir`
    #[arg(long)]
    pub candle_dir: Option<PathBuf>,

    /// Start time (RFC 3339); defaults to the first signal candle close
    #[arg(long)]
    pub start: Option<String>,

    /// End time (RFC 3339); defaults to the last signal candle close
    #[arg(long)]
    pub end: Option<String>,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Write every decision as JSON lines to this file
    #[arg(long)]
    pub decisions: Option<PathBuf>,
}

fn parse_time(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp: {value}"))?
        .with_timezone(&Utc))
}

impl ReplayArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let dir = self
            .candle_dir
            .clone()
            .unwrap_or_else(|| config.data.candle_dir.clone());
        let layout = CsvCandleSource::new(&dir);
        let signal_tf = config.engine.signal_timeframe;

        let mut candles = vec![];
        for symbol in &config.engine.symbols {
            for tf in [signal_tf, config.engine.regime_timeframe] {
                let path = layout.series_path(symbol, tf);
                let series = load_file(&path, symbol, tf)
                    .await
                    .with_context(|| format!("loading {}", path.display()))?;
                tracing::info!(symbol = %symbol, timeframe = %tf, rows = series.len(), "Loaded candles");
                candles.extend(series);
            }
        }

        let (first, last) = ReplayRunner::span(&candles, signal_tf)
            .context("no signal-timeframe candles to replay")?;
        let start = self.start.as_deref().map(parse_time).transpose()?.unwrap_or(first);
        let end = self.end.as_deref().map(parse_time).transpose()?.unwrap_or(last);

        let source = Arc::new(MemoryCandleSource::from_candles(candles));
        let result = ReplayRunner::new(config, source).run(start, end).await?;

        if let Some(path) = &self.decisions {
            let mut out = std::io::BufWriter::new(
                std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
            );
            for decision in &result.decisions {
                serde_json::to_writer(&mut out, decision)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }

        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&result.summaries)?),
            _ => {
                for (portfolio, summary) in &result.summaries {
                    println!("{}", summary.format_table(portfolio));
                }
            }
        }
        Ok(())
    }
}
