//! Logging, in-process metrics and component health for the presence engine.
//!
//! Metrics are flushed to ClickHouse by the worker rather than exported to
//! an external metrics system.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
