//! Stale session reaper.
//!
//! Closes every open session whose last heartbeat is older than the
//! inactivity threshold. Already-closed sessions are excluded by the store's
//! filter, so running twice closes nothing new.

use std::sync::Arc;
use std::time::Instant;

use presence_core::Result;
use telemetry::metrics;
use tracing::{debug, info};
use tracker::Tracker;

pub struct ReaperWorker {
    tracker: Arc<Tracker>,
    threshold: chrono::Duration,
}

impl ReaperWorker {
    pub fn new(tracker: Arc<Tracker>, threshold: chrono::Duration) -> Self {
        Self { tracker, threshold }
    }

    /// One pass. Failures are returned to the caller; the next tick is the
    /// retry.
    pub async fn run(&self) -> Result<u64> {
        let start = Instant::now();
        metrics().reaper_runs.inc();

        let closed = self.tracker.reap_inactive(self.threshold).await;
        metrics().reaper_latency_ms.observe_since(start);
        let closed = closed?;

        metrics().last_reap_count.set(closed);
        if closed > 0 {
            info!(
                count = closed,
                threshold_secs = self.threshold.num_seconds(),
                latency_ms = %start.elapsed().as_millis(),
                "Reaper pass complete"
            );
        } else {
            debug!("Reaper pass found no inactive sessions");
        }
        Ok(closed)
    }
}
