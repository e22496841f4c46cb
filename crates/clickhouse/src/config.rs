//! ClickHouse configuration.

use serde::{Deserialize, Serialize};

/// ClickHouse client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    pub url: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Let the server buffer single-row event inserts
    #[serde(default = "default_async_insert")]
    pub async_insert: bool,
    /// Days an activity event is kept before the TTL drops it
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_database() -> String {
    "presence".to_string()
}

fn default_async_insert() -> bool {
    true
}

fn default_retention_days() -> u32 {
    365
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: default_database(),
            username: None,
            password: None,
            async_insert: default_async_insert(),
            retention_days: default_retention_days(),
        }
    }
}
