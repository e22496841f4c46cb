//! In-process metrics.
//!
//! Counters and histograms live in a global registry; the worker snapshots
//! them once a minute and writes the snapshot to ClickHouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonically increasing count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Upper bounds: 1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 30000 ms.
    /// The last bucket also takes everything above it.
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 30000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Records the time elapsed since `start`.
    pub fn observe_since(&self, start: Instant) {
        self.observe(start.elapsed().as_millis() as u64);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the presence engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Session lifecycle
    pub sessions_created: Counter,
    pub sessions_reopened: Counter,
    pub sessions_closed: Counter,
    pub sessions_reaped: Counter,
    pub heartbeats_applied: Counter,
    pub heartbeats_missed: Counter,

    // Events
    pub events_recorded: Counter,
    pub events_rejected: Counter,
    pub page_views_derived: Counter,

    // Stores
    pub store_errors: Counter,
    pub store_timeouts: Counter,
    pub session_store_latency_ms: Histogram,
    pub event_store_latency_ms: Histogram,

    // Reaper
    pub reaper_runs: Counter,
    pub reaper_latency_ms: Histogram,
    pub last_reap_count: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            sessions_created: self.sessions_created.get(),
            sessions_reopened: self.sessions_reopened.get(),
            sessions_closed: self.sessions_closed.get(),
            sessions_reaped: self.sessions_reaped.get(),
            heartbeats_applied: self.heartbeats_applied.get(),
            heartbeats_missed: self.heartbeats_missed.get(),
            events_recorded: self.events_recorded.get(),
            events_rejected: self.events_rejected.get(),
            page_views_derived: self.page_views_derived.get(),
            store_errors: self.store_errors.get(),
            store_timeouts: self.store_timeouts.get(),
            session_store_latency_mean_ms: self.session_store_latency_ms.mean(),
            event_store_latency_mean_ms: self.event_store_latency_ms.mean(),
            reaper_runs: self.reaper_runs.get(),
            reaper_latency_mean_ms: self.reaper_latency_ms.mean(),
            last_reap_count: self.last_reap_count.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub sessions_created: u64,
    pub sessions_reopened: u64,
    pub sessions_closed: u64,
    pub sessions_reaped: u64,
    pub heartbeats_applied: u64,
    pub heartbeats_missed: u64,
    pub events_recorded: u64,
    pub events_rejected: u64,
    pub page_views_derived: u64,
    pub store_errors: u64,
    pub store_timeouts: u64,
    pub session_store_latency_mean_ms: f64,
    pub event_store_latency_mean_ms: f64,
    pub reaper_runs: u64,
    pub reaper_latency_mean_ms: f64,
    pub last_reap_count: u64,
}

impl MetricsSnapshot {
    /// Flattens the snapshot into `(name, value)` pairs.
    pub fn values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("sessions_created", self.sessions_created as f64),
            ("sessions_reopened", self.sessions_reopened as f64),
            ("sessions_closed", self.sessions_closed as f64),
            ("sessions_reaped", self.sessions_reaped as f64),
            ("heartbeats_applied", self.heartbeats_applied as f64),
            ("heartbeats_missed", self.heartbeats_missed as f64),
            ("events_recorded", self.events_recorded as f64),
            ("events_rejected", self.events_rejected as f64),
            ("page_views_derived", self.page_views_derived as f64),
            ("store_errors", self.store_errors as f64),
            ("store_timeouts", self.store_timeouts as f64),
            ("session_store_latency_mean_ms", self.session_store_latency_mean_ms),
            ("event_store_latency_mean_ms", self.event_store_latency_mean_ms),
            ("reaper_runs", self.reaper_runs as f64),
            ("reaper_latency_mean_ms", self.reaper_latency_mean_ms),
            ("last_reap_count", self.last_reap_count as f64),
        ]
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
