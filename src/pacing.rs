//! Fixed-interval pacing for calls to rate-limited collaborators.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait until the next call may be issued.
    async fn pace(&self);
}

/// Sleeps a fixed interval on the tokio clock, so paused-time tests observe
/// the delay without waiting for it.
#[derive(Debug, Clone, Copy)]
pub struct IntervalPacer {
    interval: Duration,
}

impl IntervalPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Pacer for IntervalPacer {
    async fn pace(&self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

#[async_trait]
impl Pacer for NoPacing {
    async fn pace(&self) {}
}

/// Pacer for a configured interval in milliseconds; zero disables pacing.
pub fn from_millis(ms: u64) -> Box<dyn Pacer> {
    if ms == 0 {
        Box::new(NoPacing)
    } else {
        Box::new(IntervalPacer::new(Duration::from_millis(ms)))
    }
}
