//! Background workers for the presence engine.
//!
//! - Reaper (closes sessions that stopped sending heartbeats)
//! - Metrics flush (in-process metrics → ClickHouse `internal_metrics`)

pub mod flush;
pub mod reaper;
pub mod scheduler;

pub use flush::MetricsFlushWorker;
pub use reaper::ReaperWorker;
pub use scheduler::*;
