//! Local storage: the project registry the sync job reads and the metrics
//! table it writes.
//!
//! - `repo`: SQL-only functions over a SQLite pool.
//! - [`ProjectStore`] / [`MetricSink`]: the contracts the sync job depends on,
//!   implemented for SQLite by [`SqliteStore`].

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{MetricRecord, Project};

pub mod repo;

pub use repo::*;

/// A bulk insert that failed as a whole.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read side of the project registry.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn count(&self) -> anyhow::Result<u64>;

    /// Projects ordered by id, skipping `offset` and returning at most `limit`.
    async fn find_page(&self, offset: u64, limit: u32) -> anyhow::Result<Vec<Project>>;
}

/// Destination of mapped metric records.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Persist `records` atomically. Returns the number of rows written.
    async fn insert_batch(&self, records: &[MetricRecord]) -> Result<u64, PersistenceError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn count(&self) -> anyhow::Result<u64> {
        count_projects(&self.pool).await
    }

    async fn find_page(&self, offset: u64, limit: u32) -> anyhow::Result<Vec<Project>> {
        find_project_page(&self.pool, offset, limit).await
    }
}

#[async_trait]
impl MetricSink for SqliteStore {
    async fn insert_batch(&self, records: &[MetricRecord]) -> Result<u64, PersistenceError> {
        insert_metric_batch(&self.pool, records).await
    }
}
