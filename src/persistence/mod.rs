//! Persistence module
//!
//! Idempotent upserts of positions and orders plus portfolio metadata
//! reads. Writes are fire-and-forget: in-memory portfolio state stays the
//! source of truth and a failed write is only logged.

mod jsonl;
mod memory;
mod types;
mod writer;

pub use jsonl::{JsonlSnapshot, JsonlStore};
pub use memory::MemoryStore;
pub use types::{
    OrderRecord, PersistRequest, PortfolioMeta, PortfolioStatus, PositionRecord, PositionStatus,
};
pub use writer::PersistenceWriter;

use async_trait::async_trait;

/// Trait for persistence store implementations
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Insert or replace a position keyed by (portfolio, symbol, position id)
    async fn upsert_position(&self, record: PositionRecord) -> anyhow::Result<()>;
    /// Insert or replace an order keyed by (portfolio, symbol, position id, order id)
    async fn upsert_order(&self, record: OrderRecord) -> anyhow::Result<()>;
    /// Read portfolio metadata
    async fn portfolio_meta(&self, portfolio_id: &str) -> anyhow::Result<Option<PortfolioMeta>>;
    /// Insert or replace portfolio metadata
    async fn upsert_portfolio_meta(&self, meta: PortfolioMeta) -> anyhow::Result<()>;
    /// Record the cash balance without touching status or starting capital.
    /// A portfolio with no metadata yet is left alone.
    async fn update_portfolio_cash(&self, portfolio_id: &str, cash: f64) -> anyhow::Result<()>;
    /// Latest record of every position still open for a portfolio
    async fn open_positions(&self, portfolio_id: &str) -> anyhow::Result<Vec<PositionRecord>>;

    /// Apply one ledger request
    async fn apply(&self, request: PersistRequest) -> anyhow::Result<()> {
        match request {
            PersistRequest::Position(record) => self.upsert_position(record).await,
            PersistRequest::Order(record) => self.upsert_order(record).await,
            PersistRequest::Cash { portfolio_id, cash } => {
                self.update_portfolio_cash(&portfolio_id, cash).await
            }
        }
    }
}
