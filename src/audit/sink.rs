//! Audit sinks

use super::{AuditSink, Decision};
use std::sync::Mutex;

/// Writes each decision as one structured event on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, d: &Decision) {
        metrics::counter!(
            "engine_decisions_total",
            "stage" => d.stage.as_str(),
            "action" => d.action.as_str()
        )
        .increment(1);

        tracing::info!(
            target: "audit",
            tick = d.tick,
            at = %d.at,
            portfolio = %d.portfolio_id,
            symbol = %d.symbol,
            stage = %d.stage,
            action = %d.action,
            reason = %d.reason,
            debug = %d.debug,
            "decision"
        );
    }
}

/// Keeps decisions in memory, for replay and tests
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    decisions: Mutex<Vec<Decision>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<Decision> {
        self.decisions
            .lock()
            .map(|mut d| std::mem::take(&mut *d))
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, decision: &Decision) {
        if let Ok(mut decisions) = self.decisions.lock() {
            decisions.push(decision.clone());
        }
    }
}

/// Fan out to several sinks
impl AuditSink for Vec<std::sync::Arc<dyn AuditSink>> {
    fn record(&self, decision: &Decision) {
        for sink in self {
            sink.record(decision);
        }
    }
}
