//! In-memory persistence store

use super::{OrderRecord, PersistenceStore, PortfolioMeta, PositionRecord, PositionStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

type PositionKey = (String, String, Uuid);
type OrderKey = (String, String, Uuid, Uuid);

/// HashMap-backed store, used by replay and tests
#[derive(Default)]
pub struct MemoryStore {
    positions: RwLock<HashMap<PositionKey, PositionRecord>>,
    orders: RwLock<HashMap<OrderKey, OrderRecord>>,
    metas: RwLock<HashMap<String, PortfolioMeta>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn positions(&self) -> Vec<PositionRecord> {
        self.positions.read().await.values().cloned().collect()
    }

    pub async fn orders(&self) -> Vec<OrderRecord> {
        self.orders.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn upsert_position(&self, record: PositionRecord) -> anyhow::Result<()> {
        self.positions.write().await.insert(record.key(), record);
        Ok(())
    }

    async fn upsert_order(&self, record: OrderRecord) -> anyhow::Result<()> {
        self.orders.write().await.insert(record.key(), record);
        Ok(())
    }

    async fn portfolio_meta(&self, portfolio_id: &str) -> anyhow::Result<Option<PortfolioMeta>> {
        Ok(self.metas.read().await.get(portfolio_id).cloned())
    }

    async fn upsert_portfolio_meta(&self, meta: PortfolioMeta) -> anyhow::Result<()> {
        self.metas
            .write()
            .await
            .insert(meta.portfolio_id.clone(), meta);
        Ok(())
    }

    async fn update_portfolio_cash(&self, portfolio_id: &str, cash: f64) -> anyhow::Result<()> {
        if let Some(meta) = self.metas.write().await.get_mut(portfolio_id) {
            meta.cash = cash;
        }
        Ok(())
    }

    async fn open_positions(&self, portfolio_id: &str) -> anyhow::Result<Vec<PositionRecord>> {
        Ok(self
            .positions
            .read()
            .await
            .values()
            .filter(|r| r.portfolio_id == portfolio_id && r.status == PositionStatus::Open)
            .cloned()
            .collect())
    }
}
