//! Read queries over `activity_events`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use presence_core::{
    ActivityEvent, Error, EventType, OrgId, Result, Scope, SessionId, TimeRange, UserId,
};

use crate::client::ClickHouseClient;
use crate::insert::{ActivityEventRow, EVENT_COLUMNS};

/// Millisecond timestamp parameter.
const TS: &str = "fromUnixTimestamp64Milli(toInt64(?))";

fn ids<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn decode(rows: Vec<ActivityEventRow>) -> Result<Vec<ActivityEvent>> {
    rows.into_iter().map(ActivityEvent::try_from).collect()
}

async fn fetch(query: clickhouse::query::Query, op: &'static str) -> Result<Vec<ActivityEvent>> {
    let rows: Vec<ActivityEventRow> = query
        .fetch_all()
        .await
        .map_err(|e| Error::store(op, e.to_string()))?;
    decode(rows)
}

fn select(filter: &str, order: &str) -> String {
    format!(
        "SELECT {} FROM activity_events WHERE {} ORDER BY {}",
        EVENT_COLUMNS, filter, order
    )
}

pub async fn events_by_session(
    client: &ClickHouseClient,
    session: SessionId,
) -> Result<Vec<ActivityEvent>> {
    let sql = select("session_id = ?", "timestamp ASC, event_id ASC");
    let q = client.inner().query(&sql).bind(session.to_string());
    fetch(q, "events.by_session").await
}

pub async fn events_by_user(
    client: &ClickHouseClient,
    user: UserId,
    limit: u64,
) -> Result<Vec<ActivityEvent>> {
    let sql = format!("{} LIMIT ?", select("user_id = ?", "timestamp DESC, event_id DESC"));
    let q = client
        .inner()
        .query(&sql)
        .bind(user.to_string())
        .bind(limit);
    fetch(q, "events.by_user").await
}

pub async fn events_by_user_in_range(
    client: &ClickHouseClient,
    user: UserId,
    range: TimeRange,
) -> Result<Vec<ActivityEvent>> {
    let filter = format!("user_id = ? AND timestamp >= {TS} AND timestamp < {TS}");
    let sql = select(&filter, "timestamp ASC, event_id ASC");
    let q = client
        .inner()
        .query(&sql)
        .bind(user.to_string())
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis());
    fetch(q, "events.by_user_in_range").await
}

pub async fn events_by_organization(
    client: &ClickHouseClient,
    org: OrgId,
    limit: u64,
) -> Result<Vec<ActivityEvent>> {
    let sql = format!(
        "{} LIMIT ?",
        select("organization_id = ?", "timestamp DESC, event_id DESC")
    );
    let q = client
        .inner()
        .query(&sql)
        .bind(org.to_string())
        .bind(limit);
    fetch(q, "events.by_organization").await
}

pub async fn latest_events_for_users(
    client: &ClickHouseClient,
    users: &[UserId],
    types: &[EventType],
    since: DateTime<Utc>,
) -> Result<HashMap<UserId, ActivityEvent>> {
    if users.is_empty() || types.is_empty() {
        return Ok(HashMap::new());
    }

    let filter = format!("has(?, user_id) AND has(?, event_type) AND timestamp >= {TS}");
    let sql = format!(
        "{} LIMIT 1 BY user_id",
        select(&filter, "user_id, timestamp DESC")
    );
    let q = client
        .inner()
        .query(&sql)
        .bind(ids(users))
        .bind(ids(types))
        .bind(since.timestamp_millis());
    let events = fetch(q, "events.latest_for_users").await?;
    Ok(events.into_iter().map(|e| (e.user_id, e)).collect())
}

pub async fn count_events_by_type(
    client: &ClickHouseClient,
    user: UserId,
    event_type: &EventType,
    range: TimeRange,
) -> Result<u64> {
    let sql = format!(
        "SELECT count() FROM activity_events \
         WHERE user_id = ? AND event_type = ? AND timestamp >= {TS} AND timestamp < {TS}"
    );
    client
        .inner()
        .query(&sql)
        .bind(user.to_string())
        .bind(event_type.as_str())
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_one::<u64>()
        .await
        .map_err(|e| Error::store("events.count_by_type", e.to_string()))
}

pub async fn events_in_range(
    client: &ClickHouseClient,
    scope: &Scope,
    range: TimeRange,
    event_type: Option<&EventType>,
) -> Result<Vec<ActivityEvent>> {
    if scope.is_empty_selection() {
        return Ok(Vec::new());
    }

    let mut filter = format!("timestamp >= {TS} AND timestamp < {TS}");
    if scope.user_ids.is_some() {
        filter.push_str(" AND has(?, user_id)");
    }
    if scope.organization_id.is_some() {
        filter.push_str(" AND organization_id = ?");
    }
    if event_type.is_some() {
        filter.push_str(" AND event_type = ?");
    }

    let sql = select(&filter, "timestamp DESC, event_id DESC");
    let mut q = client
        .inner()
        .query(&sql)
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis());
    if let Some(users) = &scope.user_ids {
        q = q.bind(ids(users));
    }
    if let Some(org) = scope.organization_id {
        q = q.bind(org.to_string());
    }
    if let Some(t) = event_type {
        q = q.bind(t.as_str());
    }
    fetch(q, "events.in_range").await
}

/// Count all events (tests and admin).
pub async fn count_all_events(client: &ClickHouseClient) -> Result<u64> {
    client
        .inner()
        .query("SELECT count() FROM activity_events")
        .fetch_one::<u64>()
        .await
        .map_err(|e| Error::store("events.count_all", e.to_string()))
}

/// Truncate all events (test cleanup).
pub async fn truncate_events(client: &ClickHouseClient) -> Result<()> {
    client
        .inner()
        .query("TRUNCATE TABLE IF EXISTS activity_events")
        .execute()
        .await
        .map_err(|e| Error::store("events.truncate", e.to_string()))
}
