use async_trait::async_trait;
use publish_pipeline::config::PipelineSettings;
use publish_pipeline::db::{self, ContentStore, SqliteStore};
use publish_pipeline::indexing::{CanonicalUrls, IndexingConnector, IndexingError, IndexingNotifier};
use publish_pipeline::model::{Outcome, RecordId, RecordStatus, StageStatus};
use publish_pipeline::pacing::NoPacing;
use publish_pipeline::revalidate::{RevalidationError, Revalidator};
use publish_pipeline::{Pipeline, PipelineError};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const AUTH: &str = "Bearer test-cron-secret";

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Clone, Default)]
struct RecordingRevalidator {
    fail: Vec<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingRevalidator {
    fn failing(slugs: &[&str]) -> Self {
        Self {
            fail: slugs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Revalidator for RecordingRevalidator {
    async fn revalidate(&self, slug: &str) -> Result<(), RevalidationError> {
        self.calls.lock().await.push(slug.to_string());
        if self.fail.iter().any(|s| s == slug) {
            return Err(RevalidationError::Status {
                status: 504,
                body: "gateway timeout".into(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingIndexer {
    fail: Vec<String>,
    broken_setup: bool,
    connects: Arc<Mutex<usize>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingIndexer {
    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl IndexingNotifier for RecordingIndexer {
    async fn notify_updated(&self, url: &Url) -> Result<(), IndexingError> {
        self.calls.lock().await.push(url.to_string());
        if self.fail.iter().any(|s| url.path().ends_with(s.as_str())) {
            return Err(IndexingError::Status {
                status: 429,
                body: "rate limited".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IndexingConnector for RecordingIndexer {
    async fn connect(&self) -> Result<Arc<dyn IndexingNotifier>, IndexingError> {
        *self.connects.lock().await += 1;
        if self.broken_setup {
            return Err(IndexingError::Credential("expected value at line 1".into()));
        }
        Ok(Arc::new(self.clone()))
    }
}

fn build(
    store: Arc<dyn ContentStore>,
    revalidator: RecordingRevalidator,
    indexer: Option<RecordingIndexer>,
) -> Pipeline {
    Pipeline::new(
        PipelineSettings {
            cron_secret: "test-cron-secret".into(),
            batch_limit: 100,
            store_timeout: Duration::from_secs(5),
        },
        store,
        Arc::new(revalidator),
        indexer.map(|i| Arc::new(i) as Arc<dyn IndexingConnector>),
        Arc::new(NoPacing),
        CanonicalUrls::new("https://valifye.com", "ideas").unwrap(),
    )
}

async fn seed(pool: &sqlx::SqlitePool, slugs: &[&str]) -> Vec<RecordId> {
    let mut ids = Vec::new();
    for slug in slugs {
        ids.push(db::insert_draft(pool, slug, None).await.unwrap());
    }
    ids
}

#[tokio::test]
async fn publishes_batch_and_counts_partial_failures() {
    let pool = setup_pool().await;
    let ids = seed(&pool, &["a", "b", "c"]).await;

    let revalidator = RecordingRevalidator::failing(&["c"]);
    let indexer = RecordingIndexer::default();
    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        revalidator.clone(),
        Some(indexer.clone()),
    );

    let summary = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(summary.published_count, 3);
    assert_eq!(summary.revalidation_failures, 1);
    assert_eq!(summary.indexing_failures, 0);

    for id in ids {
        let rec = db::fetch_record(&pool, id).await.unwrap().unwrap();
        assert_eq!(rec.status, RecordStatus::Published);
        let published_at = rec.published_at.expect("published_at set");
        assert!(published_at <= rec.updated_at);
    }

    assert_eq!(revalidator.calls().await, vec!["a", "b", "c"]);
    assert_eq!(
        indexer.calls().await,
        vec![
            "https://valifye.com/ideas/a",
            "https://valifye.com/ideas/b",
            "https://valifye.com/ideas/c",
        ]
    );
    let failed = &summary.revalidation.outcomes[2];
    assert_eq!(failed.slug, "c");
    assert!(matches!(failed.outcome, Outcome::Failed { ref error } if error.contains("504")));
}

#[tokio::test]
async fn second_run_without_new_drafts_publishes_nothing() {
    let pool = setup_pool().await;
    seed(&pool, &["a", "b"]).await;

    let revalidator = RecordingRevalidator::default();
    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        revalidator.clone(),
        None,
    );

    assert_eq!(pipeline.run(Some(AUTH)).await.unwrap().published_count, 2);
    let first = db::fetch_all_records(&pool).await.unwrap();

    let second = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(second.published_count, 0);
    assert_eq!(second.revalidation_failures, 0);
    assert_eq!(second.indexing_failures, 0);
    assert_eq!(revalidator.calls().await.len(), 2);

    // Stamps are untouched by the no-op run.
    let after = db::fetch_all_records(&pool).await.unwrap();
    for (before, after) in first.iter().zip(after.iter()) {
        assert_eq!(before.published_at, after.published_at);
        assert_eq!(before.updated_at, after.updated_at);
    }
}

#[tokio::test]
async fn new_drafts_are_picked_up_by_the_next_run() {
    let pool = setup_pool().await;
    seed(&pool, &["a"]).await;
    let revalidator = RecordingRevalidator::default();
    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        revalidator.clone(),
        None,
    );

    pipeline.run(Some(AUTH)).await.unwrap();
    seed(&pool, &["b"]).await;
    let summary = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(summary.published_count, 1);
    assert_eq!(revalidator.calls().await, vec!["a", "b"]);
}

#[tokio::test]
async fn indexing_failures_are_isolated_per_record() {
    let pool = setup_pool().await;
    seed(&pool, &["a", "b", "c", "d"]).await;

    let indexer = RecordingIndexer {
        fail: vec!["/a".into(), "/c".into()],
        ..Default::default()
    };
    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        RecordingRevalidator::default(),
        Some(indexer.clone()),
    );

    let summary = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(summary.published_count, 4);
    assert_eq!(summary.revalidation_failures, 0);
    assert_eq!(summary.indexing_failures, 2);
    assert_eq!(indexer.calls().await.len(), 4);
}

#[tokio::test]
async fn unconfigured_indexing_makes_no_calls() {
    let pool = setup_pool().await;
    seed(&pool, &["a", "b"]).await;

    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        RecordingRevalidator::default(),
        None,
    );
    let summary = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(summary.indexing_failures, 0);
    assert_eq!(summary.indexing.status, StageStatus::Skipped);
    assert!(summary.indexing.outcomes.is_empty());
}

#[tokio::test]
async fn broken_indexing_setup_does_not_fail_the_run() {
    let pool = setup_pool().await;
    seed(&pool, &["a", "b"]).await;

    let indexer = RecordingIndexer {
        broken_setup: true,
        ..Default::default()
    };
    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        RecordingRevalidator::default(),
        Some(indexer.clone()),
    );

    let summary = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(summary.published_count, 2);
    assert!(matches!(summary.indexing.status, StageStatus::Abandoned { .. }));
    assert_eq!(*indexer.connects.lock().await, 1);
    assert!(indexer.calls().await.is_empty());
    assert_eq!(
        db::count_by_status(&pool, RecordStatus::Published).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn every_notification_failing_still_succeeds() {
    let pool = setup_pool().await;
    seed(&pool, &["a", "b"]).await;

    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        RecordingRevalidator::failing(&["a", "b"]),
        Some(RecordingIndexer {
            fail: vec!["/a".into(), "/b".into()],
            ..Default::default()
        }),
    );

    let summary = pipeline.run(Some(AUTH)).await.unwrap();
    assert_eq!(summary.published_count, 2);
    assert_eq!(summary.revalidation_failures, 2);
    assert_eq!(summary.indexing_failures, 2);
    assert_eq!(
        db::count_by_status(&pool, RecordStatus::Draft).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn wrong_secret_leaves_store_untouched() {
    let pool = setup_pool().await;
    seed(&pool, &["a"]).await;

    let revalidator = RecordingRevalidator::default();
    let pipeline = build(
        Arc::new(SqliteStore::new(pool.clone())),
        revalidator.clone(),
        None,
    );

    let err = pipeline.run(Some("Bearer nope")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Unauthorized));
    assert_eq!(
        db::count_by_status(&pool, RecordStatus::Draft).await.unwrap(),
        1
    );
    assert!(revalidator.calls().await.is_empty());
}

#[tokio::test]
async fn overlapping_runs_publish_each_record_once() {
    let td = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", td.path().join("content.db").display());
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let slugs: Vec<String> = (0..20).map(|i| format!("idea-{i}")).collect();
    for slug in &slugs {
        db::insert_draft(&pool, slug, None).await.unwrap();
    }

    let store: Arc<dyn ContentStore> = Arc::new(SqliteStore::new(pool.clone()));
    let first = build(store.clone(), RecordingRevalidator::default(), None);
    let second = build(store, RecordingRevalidator::default(), None);

    let (a, b) = tokio::join!(first.run(Some(AUTH)), second.run(Some(AUTH)));
    let (a, b) = (a.unwrap(), b.unwrap());
    // Overlap may double-notify, but never loses a record.
    assert!(a.published_count + b.published_count >= slugs.len());

    let records = db::fetch_all_records(&pool).await.unwrap();
    assert_eq!(records.len(), slugs.len());
    for rec in records {
        assert_eq!(rec.status, RecordStatus::Published);
        assert!(rec.published_at.unwrap() <= rec.updated_at);
    }
}
