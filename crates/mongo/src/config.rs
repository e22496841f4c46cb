//! MongoDB configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Server selection timeout in seconds
    #[serde(default = "default_selection_timeout_secs")]
    pub server_selection_timeout_secs: u64,
}

fn default_database() -> String {
    "presence".to_string()
}

fn default_collection() -> String {
    "sessions".to_string()
}

fn default_selection_timeout_secs() -> u64 {
    5
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: default_database(),
            collection: default_collection(),
            server_selection_timeout_secs: default_selection_timeout_secs(),
        }
    }
}
