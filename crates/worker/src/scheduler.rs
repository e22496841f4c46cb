//! Worker scheduler for background tasks.

use std::sync::Arc;
use std::time::Duration;

use clickhouse_client::ClickHouseClient;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracker::Tracker;

use crate::flush::MetricsFlushWorker;
use crate::reaper::ReaperWorker;

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Reaper interval in seconds
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
    /// Idle time after which an open session is closed, in seconds
    #[serde(default = "default_inactive_threshold")]
    pub inactive_threshold_secs: u64,
    /// Metrics flush interval in seconds
    #[serde(default = "default_metrics_flush_interval")]
    pub metrics_flush_interval_secs: u64,
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_inactive_threshold() -> u64 {
    600
}

fn default_metrics_flush_interval() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reaper_interval_secs: default_reaper_interval(),
            inactive_threshold_secs: default_inactive_threshold(),
            metrics_flush_interval_secs: default_metrics_flush_interval(),
        }
    }
}

impl WorkerConfig {
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    pub fn inactive_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactive_threshold_secs as i64)
    }

    pub fn metrics_flush_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_flush_interval_secs.max(1))
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    tracker: Arc<Tracker>,
    clickhouse: Option<Arc<ClickHouseClient>>,
    shutdown: watch::Receiver<bool>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        tracker: Arc<Tracker>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            tracker,
            clickhouse: None,
            shutdown,
        }
    }

    /// Enables the metrics flush worker.
    pub fn with_clickhouse(mut self, clickhouse: Arc<ClickHouseClient>) -> Self {
        self.clickhouse = Some(clickhouse);
        self
    }

    /// Starts all background workers. Each stops once `true` is sent on the
    /// shutdown channel.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        // Reaper
        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_reaper().await;
        }));

        // Metrics flush worker
        if self.clickhouse.is_some() {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_metrics_flush().await;
            }));
        }

        info!(workers = handles.len(), "Background workers started");
        handles
    }

    async fn run_reaper(&self) {
        let worker = ReaperWorker::new(self.tracker.clone(), self.config.inactive_threshold());
        let mut ticker = interval(self.config.reaper_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = worker.run().await {
                error!("Reaper error: {}", e);
            }
        }
        info!("Reaper stopped");
    }

    async fn run_metrics_flush(&self) {
        let Some(clickhouse) = self.clickhouse.clone() else {
            return;
        };
        let worker = MetricsFlushWorker::new(clickhouse);
        let mut ticker = interval(self.config.metrics_flush_interval());
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = worker.run().await {
                error!("Failed to flush metrics: {}", e);
            }
        }

        // Last flush so the final interval is not lost.
        if let Err(e) = worker.run().await {
            error!("Failed to flush metrics on shutdown: {}", e);
        }
        info!("Metrics flush stopped");
    }
}
