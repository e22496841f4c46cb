//! Session and activity tracking.
//!
//! [`Tracker`] is the single entry point for writers (login, heartbeat,
//! logout, event recording, the reaper) and for the read-side views built on
//! top of the session and event stores.

pub mod config;
pub mod service;
pub mod views;

pub use config::TrackerConfig;
pub use service::{Heartbeat, HeartbeatResult, LoginRequest, Tracker};
pub use views::MemberTimeline;
