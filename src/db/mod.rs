//! Database module: the content store gateway.
//!
//! - `model`: row shapes returned by repository queries.
//! - `repo`: SQL-only functions over a `SqlitePool`.
//!
//! The pipeline talks to the store through the [`ContentStore`] trait;
//! [`SqliteStore`] is the production implementation backed by `repo`.

pub mod model;
pub mod repo;

pub use repo::*;

use crate::model::{DraftRef, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("store call timed out")]
    Timeout,
    #[error("store returned unexpected data: {0}")]
    Corrupt(String),
}

/// Read/write access to content records needed by the publish pipeline.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Up to `limit` records with status `draft`, in a stable order.
    async fn select_drafts(&self, limit: u32) -> Result<Vec<DraftRef>, StoreError>;

    /// Atomically mark the given drafts published, stamping `now`.
    /// Returns the number of rows that changed.
    async fn publish(&self, ids: &[RecordId], now: DateTime<Utc>) -> Result<u64, StoreError>;
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
impl ContentStore for SqliteStore {
    async fn select_drafts(&self, limit: u32) -> Result<Vec<DraftRef>, StoreError> {
        repo::select_drafts(&self.pool, limit).await
    }

    async fn publish(&self, ids: &[RecordId], now: DateTime<Utc>) -> Result<u64, StoreError> {
        repo::publish_records(&self.pool, ids, now).await
    }
}
