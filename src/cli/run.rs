//! Run command implementation

use crate::audit::TracingAuditSink;
use crate::config::Config;
use crate::engine::{Engine, Scheduler, SystemClock};
use crate::market::CsvCandleSource;
use crate::persistence::{JsonlStore, MemoryStore, PersistenceStore};
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single tick and exit
    #[arg(long)]
    pub once: bool,

    /// Candle CSV directory, overrides `data.candle_dir`
    #[arg(long)]
    pub candle_dir: Option<PathBuf>,

    /// JSON-lines store file, overrides `data.store_path`
    #[arg(long)]
    pub store: Option<PathBuf>,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        if config.portfolios.is_empty() {
            tracing::warn!("No portfolios configured, every tick will be empty");
        }

        let candle_dir = self
            .candle_dir
            .clone()
            .unwrap_or_else(|| config.data.candle_dir.clone());
        let store: Arc<dyn PersistenceStore> =
            match self.store.clone().or_else(|| config.data.store_path.clone()) {
                Some(path) => {
                    tracing::info!(path = %path.display(), "Using JSON-lines store");
                    Arc::new(JsonlStore::open(path).await?)
                }
                None => {
                    tracing::warn!("No store configured, persistence is in-memory only");
                    Arc::new(MemoryStore::new())
                }
            };

        let interval = Duration::from_secs(config.engine.tick_interval_secs);
        let mut engine = Engine::new(
            config,
            Arc::new(CsvCandleSource::new(candle_dir)),
            store,
            Arc::new(TracingAuditSink),
        );
        engine.bootstrap().await;

        if self.once {
            let report = engine.tick(Utc::now()).await;
            tracing::info!(
                decisions = report.decisions.len(),
                opened = report.opened.len(),
                closed = report.closed.len(),
                "Single tick finished"
            );
            engine.shutdown().await;
            return Ok(());
        }

        let engine = Arc::new(Mutex::new(engine));
        let scheduler = Scheduler::new(engine.clone(), Arc::new(SystemClock), interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown requested, finishing current tick"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c"),
            }
            let _ = shutdown_tx.send(true);
        });

        scheduler.run(shutdown_rx).await;
        drop(scheduler);

        match Arc::try_unwrap(engine) {
            Ok(engine) => engine.into_inner().shutdown().await,
            Err(_) => tracing::warn!("Engine still shared at shutdown, pending writes may be lost"),
        }
        Ok(())
    }
}
