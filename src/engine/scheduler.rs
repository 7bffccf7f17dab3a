//! Non-overlapping tick loop

use super::{Clock, Engine, TickReport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

/// Drives [`Engine::tick`] on a fixed interval.
///
/// Each tick holds the engine lock until it finishes, so two ticks never
/// run at once. Shutdown stops scheduling but never cancels a tick that
/// has already started.
pub struct Scheduler {
    engine: Arc<Mutex<Engine>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    skipped: AtomicU64,
}

impl Scheduler {
    pub fn new(engine: Arc<Mutex<Engine>>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            engine,
            clock,
            interval,
            skipped: AtomicU64::new(0),
        }
    }

    /// Ticks refused because another one was still running
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Tick until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "Scheduler started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let mut engine = self.engine.lock().await;
                    let report = engine.tick(self.clock.now()).await;
                    log_report(&report);
                }
            }
        }

        tracing::info!(skipped = self.skipped(), "Scheduler stopped");
    }

    /// Run a tick now unless one is already in flight
    pub async fn trigger(&self) -> Option<TickReport> {
        let Ok(mut engine) = self.engine.try_lock() else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("engine_ticks_skipped_total").increment(1);
            tracing::warn!("Tick already in progress, skipping");
            return None;
        };
        let report = engine.tick(self.clock.now()).await;
        log_report(&report);
        Some(report)
    }
}

fn log_report(report: &TickReport) {
    tracing::info!(
        tick = report.tick,
        decisions = report.decisions.len(),
        opened = report.opened.len(),
        closed = report.closed.len(),
        "Tick finished"
    );
}
