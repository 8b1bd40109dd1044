//! Search indexing notifications for freshly published pages.
//!
//! The stage is optional: without a credential it is skipped. With one, a
//! single authenticated client is set up per run and every record is
//! notified in sequence, paced to stay under the service's rate limit.

use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::{DraftRef, Outcome, StageReport};
use crate::pacing::Pacer;
use crate::revalidate::join_path;

pub mod google;
pub mod model;

pub use google::{GoogleIndexingClient, GoogleIndexingConnector};

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("invalid service account credential: {0}")]
    Credential(String),
    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("token exchange failed: {0}")]
    Token(String),
    #[error("indexing request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("indexing service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid page URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("record has an empty slug")]
    EmptySlug,
}

/// An authenticated handle able to announce page updates.
#[async_trait]
pub trait IndexingNotifier: Send + Sync {
    async fn notify_updated(&self, url: &Url) -> Result<(), IndexingError>;
}

/// One-time setup producing a notifier for the duration of a run.
#[async_trait]
pub trait IndexingConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn IndexingNotifier>, IndexingError>;
}

/// Builds canonical page URLs: `{base}/{page_path}/{slug}`.
#[derive(Debug, Clone)]
pub struct CanonicalUrls {
    prefix: Url,
}

impl CanonicalUrls {
    pub fn new(base_url: &str, page_path: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            prefix: join_path(base_url, page_path)?,
        })
    }

    pub fn page(&self, slug: &str) -> Result<Url, IndexingError> {
        if slug.trim().is_empty() {
            return Err(IndexingError::EmptySlug);
        }
        let mut url = self.prefix.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(slug);
        Ok(url)
    }
}

/// Notify the indexing service about every record of the batch.
///
/// `None` means the stage is not configured. A failed setup abandons the
/// stage without attempting any record. Between consecutive attempts the
/// pacer is awaited, whether the previous attempt failed or not.
#[instrument(skip_all, fields(batch = batch.len()))]
pub async fn index_all(
    connector: Option<&dyn IndexingConnector>,
    pacer: &dyn Pacer,
    urls: &CanonicalUrls,
    batch: &[DraftRef],
) -> StageReport {
    let Some(connector) = connector else {
        info!("indexing not configured; skipping");
        return StageReport::skipped();
    };
    if batch.is_empty() {
        return StageReport::completed();
    }

    let notifier = match connector.connect().await {
        Ok(notifier) => notifier,
        Err(err) => {
            warn!(%err, "indexing setup failed; abandoning stage");
            return StageReport::abandoned(err.to_string());
        }
    };

    let mut report = StageReport::completed();
    for (i, item) in batch.iter().enumerate() {
        if i > 0 {
            pacer.pace().await;
        }
        let result = match urls.page(&item.slug) {
            Ok(url) => notifier.notify_updated(&url).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => report.record(item, Outcome::Succeeded),
            Err(err) => {
                warn!(%err, id = %item.id, slug = %item.slug, "indexing failed");
                report.record(
                    item,
                    Outcome::Failed {
                        error: err.to_string(),
                    },
                );
            }
        }
    }
    info!(
        succeeded = report.successes(),
        failed = report.failures(),
        "indexing stage finished"
    );
    report
}
