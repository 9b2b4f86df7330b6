//! The `RunStore` seam between the run controller and durable storage.
//!
//! The controller only ever writes one row per run, keyed by its execution
//! id, so concurrent runs never touch the same record.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{DbError, DbPool, models::RunRecord, repository::runs};

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or overwrite the record with `record.id`.
    async fn upsert(&self, record: &RunRecord) -> Result<(), DbError>;

    /// Fetch a record by execution id.
    async fn get(&self, id: Uuid) -> Result<RunRecord, DbError>;

    /// Every run of one automation, newest first.
    async fn list_for_automation(&self, automation_id: &str) -> Result<Vec<RunRecord>, DbError>;
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: DbPool,
}

impl PgRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn upsert(&self, record: &RunRecord) -> Result<(), DbError> {
        runs::upsert_run(&self.pool, record).await
    }

    async fn get(&self, id: Uuid) -> Result<RunRecord, DbError> {
        runs::get_run(&self.pool, id).await
    }

    async fn list_for_automation(&self, automation_id: &str) -> Result<Vec<RunRecord>, DbError> {
        runs::list_runs_for_automation(&self.pool, automation_id).await
    }
}

/// In-process store, used by the CLI when no database is configured and by tests.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    records: RwLock<HashMap<Uuid, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn upsert(&self, record: &RunRecord) -> Result<(), DbError> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<RunRecord, DbError> {
        self.records.read().await.get(&id).cloned().ok_or(DbError::NotFound)
    }

    async fn list_for_automation(&self, automation_id: &str) -> Result<Vec<RunRecord>, DbError> {
        let mut runs: Vec<RunRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.automation_id == automation_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}
