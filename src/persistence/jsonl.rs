//! Append-only JSON-lines store
//!
//! Every upsert appends one line. Reading the file back folds lines by key
//! with the last write winning, so replaying the same upsert is harmless.
//! Other processes may append too (an operator pausing a portfolio), so
//! reads re-fold the file whenever its length or mtime changes.

use super::{OrderRecord, PersistenceStore, PortfolioMeta, PositionRecord, PositionStatus};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Line {
    Position(PositionRecord),
    Order(OrderRecord),
    Meta(PortfolioMeta),
    Cash { portfolio_id: String, cash: f64 },
}

/// Latest state folded from a JSON-lines file
#[derive(Debug, Default)]
pub struct JsonlSnapshot {
    pub positions: HashMap<(String, String, Uuid), PositionRecord>,
    pub orders: HashMap<(String, String, Uuid, Uuid), OrderRecord>,
    pub metas: HashMap<String, PortfolioMeta>,
}

/// Modification time and length the cached fold was taken at
type FileStamp = (SystemTime, u64);

#[derive(Default)]
struct FoldCache {
    stamp: Option<FileStamp>,
    snapshot: JsonlSnapshot,
}

/// JSON-lines file store
pub struct JsonlStore {
    path: PathBuf,
    append_lock: Mutex<()>,
    cache: Mutex<FoldCache>,
}

impl JsonlStore {
    /// Open a store, folding an existing file. The file is created on the
    /// first write.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let store = Self {
            path: path.into(),
            append_lock: Mutex::new(()),
            cache: Mutex::new(FoldCache::default()),
        };
        store.with_snapshot(|_| ()).await?;
        Ok(store)
    }

    /// Fold a file into its latest records
    pub async fn read_snapshot(path: &Path) -> anyhow::Result<JsonlSnapshot> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        let mut snapshot = JsonlSnapshot::default();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let parsed: Line = match serde_json::from_str(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "Skipping unreadable store line");
                    continue;
                }
            };
            match parsed {
                Line::Position(r) => {
                    snapshot.positions.insert(r.key(), r);
                }
                Line::Order(r) => {
                    snapshot.orders.insert(r.key(), r);
                }
                Line::Meta(m) => {
                    snapshot.metas.insert(m.portfolio_id.clone(), m);
                }
                Line::Cash { portfolio_id, cash } => {
                    if let Some(meta) = snapshot.metas.get_mut(&portfolio_id) {
                        meta.cash = cash;
                    }
                }
            }
        }
        Ok(snapshot)
    }

    /// Run `f` on the current fold, re-reading the file only when it changed
    async fn with_snapshot<T>(&self, f: impl FnOnce(&JsonlSnapshot) -> T) -> anyhow::Result<T> {
        let mut cache = self.cache.lock().await;
        let stamp = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Some((meta.modified()?, meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("inspecting {}", self.path.display()))
            }
        };
        if stamp != cache.stamp {
            cache.snapshot = match stamp {
                Some(_) => Self::read_snapshot(&self.path).await?,
                None => JsonlSnapshot::default(),
            };
            cache.stamp = stamp;
        }
        Ok(f(&cache.snapshot))
    }

    async fn append(&self, line: &Line) -> anyhow::Result<()> {
        let mut json = serde_json::to_string(line)?;
        json.push('\n');

        let _guard = self.append_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for JsonlStore {
    async fn upsert_position(&self, record: PositionRecord) -> anyhow::Result<()> {
        self.append(&Line::Position(record)).await
    }

    async fn upsert_order(&self, record: OrderRecord) -> anyhow::Result<()> {
        self.append(&Line::Order(record)).await
    }

    async fn portfolio_meta(&self, portfolio_id: &str) -> anyhow::Result<Option<PortfolioMeta>> {
        self.with_snapshot(|s| s.metas.get(portfolio_id).cloned())
            .await
    }

    async fn upsert_portfolio_meta(&self, meta: PortfolioMeta) -> anyhow::Result<()> {
        self.append(&Line::Meta(meta)).await
    }

    async fn update_portfolio_cash(&self, portfolio_id: &str, cash: f64) -> anyhow::Result<()> {
        self.append(&Line::Cash {
            portfolio_id: portfolio_id.to_string(),
            cash,
        })
        .await
    }

    async fn open_positions(&self, portfolio_id: &str) -> anyhow::Result<Vec<PositionRecord>> {
        self.with_snapshot(|s| {
            s.positions
                .values()
                .filter(|r| r.portfolio_id == portfolio_id && r.status == PositionStatus::Open)
                .cloned()
                .collect()
        })
        .await
    }
}
