//! Background persistence dispatch

use super::{PersistRequest, PersistenceStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 1024;

/// Forwards ledger writes to a store on a background task.
///
/// Submitting never blocks the evaluation loop. A full channel or a failed
/// store write is logged and the request is dropped; the next mutation of
/// the same record upserts it again.
pub struct PersistenceWriter {
    tx: mpsc::Sender<PersistRequest>,
    handle: JoinHandle<()>,
}

impl PersistenceWriter {
    pub fn spawn(store: Arc<dyn PersistenceStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<PersistRequest>(CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let Err(e) = store.apply(request).await {
                    tracing::warn!(error = %e, "Persistence write failed");
                }
            }
            tracing::debug!("Persistence writer stopped");
        });

        Self { tx, handle }
    }

    pub fn submit(&self, request: PersistRequest) {
        if let Err(e) = self.tx.try_send(request) {
            tracing::warn!(error = %e, "Dropping persistence request");
        }
    }

    /// Close the channel and wait for queued writes to drain
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Persistence writer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Side;
    use crate::persistence::{MemoryStore, OrderRecord, PortfolioMeta, PositionRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    fn order() -> PersistRequest {
        PersistRequest::Order(OrderRecord {
            portfolio_id: "alpha".into(),
            symbol: "BTCUSDT".into(),
            position_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            side: Side::Sell,
            reference_price: 10.0,
            price: 9.99,
            size: 1.0,
            fee: 0.01,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_writer_drains_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let writer = PersistenceWriter::spawn(store.clone());

        writer.submit(order());
        writer.submit(order());
        writer.shutdown().await;

        assert_eq!(store.orders().await.len(), 2);
    }

    struct FailingStore;

    #[async_trait]
    impl PersistenceStore for FailingStore {
        async fn upsert_position(&self, _: PositionRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn upsert_order(&self, _: OrderRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn portfolio_meta(&self, _: &str) -> anyhow::Result<Option<PortfolioMeta>> {
            Ok(None)
        }
        async fn upsert_portfolio_meta(&self, _: PortfolioMeta) -> anyhow::Result<()> {
            Ok(())
        }
        async fn update_portfolio_cash(&self, _: &str, _: f64) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn open_positions(&self, _: &str) -> anyhow::Result<Vec<PositionRecord>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_fatal() {
        let writer = PersistenceWriter::spawn(Arc::new(FailingStore));
        writer.submit(order());
        writer.shutdown().await;
    }
}
