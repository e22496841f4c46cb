//! Row types and inserts.

use std::time::Instant;

use chrono::{DateTime, Utc};
use clickhouse::Row;
use presence_core::{ActivityEvent, Error, EventType, Result};
use serde::{Deserialize, Serialize};
use telemetry::MetricsSnapshot;
use tracing::debug;
use uuid::Uuid;

use crate::client::ClickHouseClient;

/// Column list matching [`ActivityEventRow`] field order.
pub const EVENT_COLUMNS: &str = "event_id, user_id, session_id, organization_id, timestamp, \
     event_type, resource_id, resource_name, page_path, details";

/// Flattened activity event.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ActivityEventRow {
    pub event_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub organization_id: Option<String>,
    pub timestamp: i64, // milliseconds since epoch
    pub event_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub page_path: Option<String>,
    pub details: String,
}

impl From<&ActivityEvent> for ActivityEventRow {
    fn from(event: &ActivityEvent) -> Self {
        Self {
            event_id: event.id.to_string(),
            user_id: event.user_id.to_string(),
            session_id: event.session_id.map(|id| id.to_string()),
            organization_id: event.organization_id.map(|id| id.to_string()),
            timestamp: event.timestamp.timestamp_millis(),
            event_type: event.event_type.to_string(),
            resource_id: event.resource_id.map(|id| id.to_string()),
            resource_name: event.resource_name.clone(),
            page_path: event.page_path.clone(),
            details: if event.details.is_null() {
                String::new()
            } else {
                event.details.to_string()
            },
        }
    }
}

fn parse_id(op: &'static str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::store(op, format!("bad id {:?}: {}", raw, e)))
}

fn parse_opt_id(op: &'static str, raw: Option<&str>) -> Result<Option<Uuid>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| parse_id(op, s))
        .transpose()
}

impl TryFrom<ActivityEventRow> for ActivityEvent {
    type Error = Error;

    fn try_from(row: ActivityEventRow) -> Result<Self> {
        const OP: &str = "events.decode";
        let timestamp = DateTime::<Utc>::from_timestamp_millis(row.timestamp)
            .ok_or_else(|| Error::store(OP, format!("bad timestamp {}", row.timestamp)))?;
        let details = if row.details.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&row.details)?
        };

        Ok(ActivityEvent {
            id: parse_id(OP, &row.event_id)?,
            user_id: parse_id(OP, &row.user_id)?,
            session_id: parse_opt_id(OP, row.session_id.as_deref())?,
            organization_id: parse_opt_id(OP, row.organization_id.as_deref())?,
            timestamp,
            event_type: EventType::from(row.event_type),
            resource_id: parse_opt_id(OP, row.resource_id.as_deref())?,
            resource_name: row.resource_name,
            page_path: row.page_path,
            details,
        })
    }
}

/// Inserts events in one request.
pub async fn insert_events(client: &ClickHouseClient, events: &[ActivityEvent]) -> Result<usize> {
    const OP: &str = "events.insert";
    if events.is_empty() {
        return Ok(0);
    }

    let start = Instant::now();
    let mut insert = client
        .inner()
        .insert("activity_events")
        .map_err(|e| Error::store(OP, e.to_string()))?;

    for event in events {
        insert
            .write(&ActivityEventRow::from(event))
            .await
            .map_err(|e| Error::store(OP, e.to_string()))?;
    }

    insert
        .end()
        .await
        .map_err(|e| Error::store(OP, e.to_string()))?;

    debug!(
        count = events.len(),
        latency_ms = %start.elapsed().as_millis(),
        "Inserted activity events"
    );

    Ok(events.len())
}

/// Internal metric sample.
#[derive(Debug, Clone, Row, Serialize)]
pub struct MetricsRow {
    pub timestamp: i64,
    pub name: String,
    pub value: f64,
}

/// Writes one row per metric in the snapshot.
pub async fn insert_metrics(client: &ClickHouseClient, snapshot: &MetricsSnapshot) -> Result<()> {
    const OP: &str = "metrics.insert";
    let timestamp = snapshot.timestamp.timestamp_millis();

    let mut insert = client
        .inner()
        .insert("internal_metrics")
        .map_err(|e| Error::store(OP, e.to_string()))?;

    for (name, value) in snapshot.values() {
        let row = MetricsRow {
            timestamp,
            name: name.to_string(),
            value,
        };
        insert
            .write(&row)
            .await
            .map_err(|e| Error::store(OP, e.to_string()))?;
    }

    insert
        .end()
        .await
        .map_err(|e| Error::store(OP, e.to_string()))?;

    Ok(())
}
