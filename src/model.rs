use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier of a content record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Published,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Published => "published",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(RecordStatus::Draft),
            "published" => Some(RecordStatus::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: RecordId,
    pub slug: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// The projection returned by draft selection: just enough to publish and
/// address the record downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftRef {
    pub id: RecordId,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: RecordId,
    pub slug: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// The stage is not configured and made no attempts.
    Skipped,
    /// One-time setup failed, so no item was attempted.
    Abandoned { reason: String },
}

/// Per-stage accumulator of item outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageReport {
    pub status: StageStatus,
    pub outcomes: Vec<ItemOutcome>,
}

impl StageReport {
    pub fn completed() -> Self {
        Self {
            status: StageStatus::Completed,
            outcomes: Vec::new(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            outcomes: Vec::new(),
        }
    }

    pub fn abandoned(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Abandoned {
                reason: reason.into(),
            },
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, item: &DraftRef, outcome: Outcome) {
        self.outcomes.push(ItemOutcome {
            id: item.id,
            slug: item.slug.clone(),
            outcome,
        });
    }

    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn successes(&self) -> usize {
        self.attempts() - self.failures()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub published_count: usize,
    pub revalidation_failures: usize,
    pub indexing_failures: usize,
    pub revalidation: StageReport,
    pub indexing: StageReport,
}

impl RunSummary {
    /// Summary of a run that found nothing to publish.
    pub fn empty() -> Self {
        Self {
            published_count: 0,
            revalidation_failures: 0,
            indexing_failures: 0,
            revalidation: StageReport::skipped(),
            indexing: StageReport::skipped(),
        }
    }

    pub fn from_stages(
        published_count: usize,
        revalidation: StageReport,
        indexing: StageReport,
    ) -> Self {
        Self {
            published_count,
            revalidation_failures: revalidation.failures(),
            indexing_failures: indexing.failures(),
            revalidation,
            indexing,
        }
    }
}
