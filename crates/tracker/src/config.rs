//! Tracker configuration.

use std::time::Duration;

use presence_core::aggregate::ClassHours;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Deadline for any single store call, in milliseconds
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Days of history shown on a member's timeline
    #[serde(default = "default_timeline_window_days")]
    pub timeline_window_days: i64,
    /// Most sessions shown on a member's timeline
    #[serde(default = "default_timeline_max_sessions")]
    pub timeline_max_sessions: u64,
    /// How recent a resource event must be to count as the current activity
    #[serde(default = "default_resource_lookback_minutes")]
    pub resource_lookback_minutes: i64,
    /// Days covered by an export when no range is given
    #[serde(default = "default_export_days")]
    pub export_default_days: i64,
    #[serde(default)]
    pub class_hours: ClassHours,
}

fn default_op_timeout_ms() -> u64 {
    30_000
}

fn default_timeline_window_days() -> i64 {
    30
}

fn default_timeline_max_sessions() -> u64 {
    100
}

fn default_resource_lookback_minutes() -> i64 {
    presence_core::presence::CURRENT_RESOURCE_LOOKBACK_MINUTES
}

fn default_export_days() -> i64 {
    30
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: default_op_timeout_ms(),
            timeline_window_days: default_timeline_window_days(),
            timeline_max_sessions: default_timeline_max_sessions(),
            resource_lookback_minutes: default_resource_lookback_minutes(),
            export_default_days: default_export_days(),
            class_hours: ClassHours::default(),
        }
    }
}

impl TrackerConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}
