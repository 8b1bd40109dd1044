//! Row shapes read straight out of `market_data`.
//!
//! Conversion into domain types lives here so repository functions stay
//! focused on SQL.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::StoreError;
use crate::model::{ContentRecord, DraftRef, RecordId, RecordStatus};

#[derive(Debug, Clone, FromRow)]
pub struct DraftRow {
    pub id: i64,
    pub slug: String,
}

impl From<DraftRow> for DraftRef {
    fn from(row: DraftRow) -> Self {
        DraftRef {
            id: RecordId(row.id),
            slug: row.slug,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: i64,
    pub slug: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecordRow> for ContentRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = RecordStatus::parse_status(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("record {} has unknown status {}", row.id, row.status))
        })?;
        Ok(ContentRecord {
            id: RecordId(row.id),
            slug: row.slug,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            published_at: row.published_at,
        })
    }
}
