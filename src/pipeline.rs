//! The publish run: authorize, select drafts, publish them, then notify the
//! cache and the search index.
//!
//! Only authorization, selection and the publish transition can fail a run.
//! Once the transition has committed the run succeeds, whatever happens to
//! the notifications afterwards.

use anyhow::Context;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

use crate::auth::{Access, AccessGuard};
use crate::config::{Config, PipelineSettings};
use crate::db::{ContentStore, StoreError};
use crate::indexing::{self, CanonicalUrls, GoogleIndexingConnector, IndexingConnector};
use crate::model::{RecordId, RunSummary};
use crate::pacing::{self, Pacer};
use crate::revalidate::{self, HttpRevalidator, Revalidator};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Pipeline {
    settings: PipelineSettings,
    guard: AccessGuard,
    store: Arc<dyn ContentStore>,
    revalidator: Arc<dyn Revalidator>,
    indexing: Option<Arc<dyn IndexingConnector>>,
    pacer: Arc<dyn Pacer>,
    urls: CanonicalUrls,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("indexing", &self.indexing.is_some())
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn ContentStore>,
        revalidator: Arc<dyn Revalidator>,
        indexing: Option<Arc<dyn IndexingConnector>>,
        pacer: Arc<dyn Pacer>,
        urls: CanonicalUrls,
    ) -> Self {
        let guard = AccessGuard::new(&settings.cron_secret);
        Self {
            settings,
            guard,
            store,
            revalidator,
            indexing,
            pacer,
            urls,
        }
    }

    /// Execute one run. `authorization` is the raw `Authorization` header
    /// value presented by the caller.
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), batch = tracing::field::Empty))]
    pub async fn run(&self, authorization: Option<&str>) -> Result<RunSummary, PipelineError> {
        if self.guard.check(authorization) == Access::Denied {
            warn!("publish run rejected: bad credential");
            return Err(PipelineError::Unauthorized);
        }

        let batch = self
            .bounded(self.store.select_drafts(self.settings.batch_limit))
            .await?;
        Span::current().record("batch", batch.len());
        if batch.is_empty() {
            info!("no drafts to publish");
            return Ok(RunSummary::empty());
        }

        let ids: Vec<RecordId> = batch.iter().map(|d| d.id).collect();
        let changed = self.bounded(self.store.publish(&ids, Utc::now())).await?;
        if changed as usize != batch.len() {
            // A concurrent run got to some rows first; they are notified again.
            warn!(
                selected = batch.len(),
                changed,
                "publish transition changed fewer rows than selected"
            );
        }
        info!(published = batch.len(), "publish transition committed");

        let revalidation = revalidate::revalidate_all(self.revalidator.as_ref(), &batch).await;
        let indexing = indexing::index_all(
            self.indexing.as_deref(),
            self.pacer.as_ref(),
            &self.urls,
            &batch,
        )
        .await;

        let summary = RunSummary::from_stages(batch.len(), revalidation, indexing);
        info!(
            published = summary.published_count,
            revalidation_failures = summary.revalidation_failures,
            indexing_failures = summary.indexing_failures,
            "publish run finished"
        );
        Ok(summary)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

/// Wire the production collaborators described by `cfg` around `store`.
pub fn from_config(cfg: &Config, store: Arc<dyn ContentStore>) -> anyhow::Result<Pipeline> {
    let revalidator = HttpRevalidator::new(
        &cfg.app.base_url,
        &cfg.revalidation.path,
        cfg.revalidation.secret.clone(),
        Duration::from_millis(cfg.revalidation.timeout_ms),
    )
    .context("failed to build revalidation client")?;

    let indexing: Option<Arc<dyn IndexingConnector>> = match cfg.indexing.credential() {
        Some(credential) => Some(Arc::new(
            GoogleIndexingConnector::with_endpoints(
                credential.to_string(),
                Duration::from_millis(cfg.indexing.timeout_ms),
                cfg.indexing.token_url.clone(),
                cfg.indexing.publish_url.clone(),
            )
            .context("failed to build indexing client")?,
        )),
        None => None,
    };
    let urls = CanonicalUrls::new(&cfg.app.base_url, &cfg.indexing.page_path)
        .context("invalid canonical page URL")?;

    Ok(Pipeline::new(
        cfg.pipeline_settings(),
        store,
        Arc::new(revalidator),
        indexing,
        Arc::from(pacing::from_millis(cfg.indexing.pacing_ms)),
        urls,
    ))
}
