//! Audit module
//!
//! Every evaluation path ends in exactly one [`Decision`] handed to an
//! [`AuditSink`].

mod sink;
mod types;

pub use sink::{MemoryAuditSink, TracingAuditSink};
pub use types::{Action, Decision, Stage};

/// Trait for audit sink implementations
pub trait AuditSink: Send + Sync {
    /// Accept one decision record
    fn record(&self, decision: &Decision);
}
