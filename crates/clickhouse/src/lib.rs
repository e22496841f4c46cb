//! ClickHouse storage for activity events and internal metrics.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use insert::insert_metrics;
pub use store::ClickHouseEventStore;
