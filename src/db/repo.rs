use super::model::{DraftRow, RecordRow};
use super::StoreError;
use crate::model::{ContentRecord, DraftRef, RecordId, RecordStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn select_drafts(pool: &Pool, limit: u32) -> Result<Vec<DraftRef>, StoreError> {
    let rows = sqlx::query_as::<_, DraftRow>(
        "SELECT id, slug FROM market_data WHERE status = ? ORDER BY id ASC LIMIT ?",
    )
    .bind(RecordStatus::Draft.as_str())
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(DraftRef::from).collect())
}

/// Single-statement transition of `ids` from draft to published.
///
/// Rows already published (by a concurrent run) are excluded by the status
/// guard, and `published_at` is never overwritten once set.
#[instrument(skip(pool, ids), fields(count = ids.len()))]
pub async fn publish_records(
    pool: &Pool,
    ids: &[RecordId],
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE market_data SET status = ");
    qb.push_bind(RecordStatus::Published.as_str())
        .push(", published_at = COALESCE(published_at, ")
        .push_bind(now)
        .push("), updated_at = ")
        .push_bind(now)
        .push(" WHERE status = ")
        .push_bind(RecordStatus::Draft.as_str())
        .push(" AND id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.0);
    }
    separated.push_unseparated(")");

    let result = qb.build().execute(&mut *tx).await?;
    tx.commit().await?;

    let changed = result.rows_affected();
    debug!(changed, "publish transition committed");
    Ok(changed)
}

/// Insert a new draft. Used by ingestion tooling and tests.
#[instrument(skip(pool))]
pub async fn insert_draft(
    pool: &Pool,
    slug: &str,
    title: Option<&str>,
) -> Result<RecordId, StoreError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO market_data (slug, title, status) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(slug)
    .bind(title)
    .bind(RecordStatus::Draft.as_str())
    .fetch_one(pool)
    .await?;
    Ok(RecordId(id))
}

pub async fn fetch_record(
    pool: &Pool,
    id: RecordId,
) -> Result<Option<ContentRecord>, StoreError> {
    let row = sqlx::query_as::<_, RecordRow>(
        r#"SELECT id, slug, status, created_at, updated_at, published_at
           FROM market_data WHERE id = ?"#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;
    row.map(ContentRecord::try_from).transpose()
}

pub async fn fetch_all_records(pool: &Pool) -> Result<Vec<ContentRecord>, StoreError> {
    let rows = sqlx::query_as::<_, RecordRow>(
        r#"SELECT id, slug, status, created_at, updated_at, published_at
           FROM market_data ORDER BY id"#,
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ContentRecord::try_from).collect()
}

pub async fn count_by_status(pool: &Pool, status: RecordStatus) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_data WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
