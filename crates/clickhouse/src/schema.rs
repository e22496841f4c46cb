//! ClickHouse table schemas.
//!
//! Tables are created unqualified and land in the client's database.
//! - LowCardinality for enum-like fields
//! - DateTime64(3) for millisecond precision
//! - JSON detail blob stored as String

/// Activity events, one row per recorded event. Never updated.
pub const CREATE_ACTIVITY_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS activity_events (
    event_id String,
    user_id String,
    session_id Nullable(String),
    organization_id Nullable(String),

    timestamp DateTime64(3),
    event_type LowCardinality(String),

    resource_id Nullable(String),
    resource_name Nullable(String),
    page_path Nullable(String),

    details String,

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (user_id, timestamp, event_id)
TTL toDateTime(timestamp) + INTERVAL {retention_days} DAY
SETTINGS index_granularity = 8192
"#;

/// Skip index for organization-wide reads.
pub const CREATE_ORG_INDEX: &str = r#"
ALTER TABLE activity_events
    ADD INDEX IF NOT EXISTS idx_org organization_id TYPE bloom_filter GRANULARITY 4
"#;

/// Skip index for session lookups.
pub const CREATE_SESSION_INDEX: &str = r#"
ALTER TABLE activity_events
    ADD INDEX IF NOT EXISTS idx_session session_id TYPE bloom_filter GRANULARITY 4
"#;

/// Internal metrics in long format, one row per metric per flush.
pub const CREATE_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS internal_metrics (
    timestamp DateTime64(3),
    name LowCardinality(String),
    value Float64
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (name, timestamp)
TTL toDateTime(timestamp) + INTERVAL 30 DAY
SETTINGS index_granularity = 8192
"#;

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", database)
}

/// Table DDL in execution order.
pub fn all_tables(retention_days: u32) -> Vec<String> {
    vec![
        CREATE_ACTIVITY_EVENTS_TABLE.replace("{retention_days}", &retention_days.to_string()),
        CREATE_ORG_INDEX.to_string(),
        CREATE_SESSION_INDEX.to_string(),
        CREATE_METRICS_TABLE.to_string(),
    ]
}
