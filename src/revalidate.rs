//! Cache revalidation: one request per published slug.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::{DraftRef, Outcome, StageReport};

#[derive(Debug, Error)]
pub enum RevalidationError {
    #[error("invalid revalidation URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("revalidation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("revalidation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self, slug: &str) -> Result<(), RevalidationError>;
}

/// Calls the content site's revalidation endpoint:
/// `GET {base}/{path}?slug=<slug>&secret=<secret>`.
#[derive(Clone)]
pub struct HttpRevalidator {
    http: Client,
    endpoint: Url,
    secret: String,
}

impl fmt::Debug for HttpRevalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRevalidator")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpRevalidator {
    pub fn new(
        base_url: &str,
        path: &str,
        secret: String,
        timeout: Duration,
    ) -> Result<Self, RevalidationError> {
        let endpoint = join_path(base_url, path)?;
        let http = Client::builder()
            .user_agent(concat!("publish-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            secret,
        })
    }

    pub fn request_url(&self, slug: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("slug", slug)
            .append_pair("secret", &self.secret);
        url
    }
}

#[async_trait]
impl Revalidator for HttpRevalidator {
    async fn revalidate(&self, slug: &str) -> Result<(), RevalidationError> {
        // The request URL carries the secret; keep it out of the error.
        let res = self
            .http
            .get(self.request_url(slug))
            .send()
            .await
            .map_err(|e| RevalidationError::Request(e.without_url()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RevalidationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Join `path` onto `base` as extra path segments, keeping any path the base
/// already has.
pub(crate) fn join_path(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.pop_if_empty();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            segments.push(part);
        }
    }
    Ok(url)
}

/// Revalidate every record of the batch in order. Failures are recorded
/// against their record and never stop the loop.
#[instrument(skip_all, fields(batch = batch.len()))]
pub async fn revalidate_all(revalidator: &dyn Revalidator, batch: &[DraftRef]) -> StageReport {
    let mut report = StageReport::completed();
    for item in batch {
        match revalidator.revalidate(&item.slug).await {
            Ok(()) => report.record(item, Outcome::Succeeded),
            Err(err) => {
                warn!(%err, id = %item.id, slug = %item.slug, "revalidate failed");
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
        "revalidation stage finished"
    );
    report
}
