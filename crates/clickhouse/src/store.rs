//! `EventStore` backed by ClickHouse.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use presence_core::{
    ActivityEvent, EventStore, EventType, OrgId, Result, Scope, SessionId, TimeRange, UserId,
};

use crate::client::ClickHouseClient;
use crate::{insert, query};

#[derive(Clone)]
pub struct ClickHouseEventStore {
    client: ClickHouseClient,
}

impl ClickHouseEventStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    /// Inserts several events in a single request.
    pub async fn record_many(&self, events: &[ActivityEvent]) -> Result<usize> {
        insert::insert_events(&self.client, events).await
    }
}

#[async_trait]
impl EventStore for ClickHouseEventStore {
    async fn record(&self, event: ActivityEvent) -> Result<()> {
        insert::insert_events(&self.client, std::slice::from_ref(&event)).await?;
        Ok(())
    }

    async fn by_session(&self, id: SessionId) -> Result<Vec<ActivityEvent>> {
        query::events_by_session(&self.client, id).await
    }

    async fn by_user(&self, user: UserId, limit: u64) -> Result<Vec<ActivityEvent>> {
        query::events_by_user(&self.client, user, limit).await
    }

    async fn by_user_in_range(&self, user: UserId, range: TimeRange) -> Result<Vec<ActivityEvent>> {
        query::events_by_user_in_range(&self.client, user, range).await
    }

    async fn by_organization(&self, org: OrgId, limit: u64) -> Result<Vec<ActivityEvent>> {
        query::events_by_organization(&self.client, org, limit).await
    }

    async fn latest_for_users(
        &self,
        users: &[UserId],
        types: &[EventType],
        since: DateTime<Utc>,
    ) -> Result<HashMap<UserId, ActivityEvent>> {
        query::latest_events_for_users(&self.client, users, types, since).await
    }

    async fn count_by_type(
        &self,
        user: UserId,
        event_type: &EventType,
        range: TimeRange,
    ) -> Result<u64> {
        query::count_events_by_type(&self.client, user, event_type, range).await
    }

    async fn in_range(
        &self,
        scope: &Scope,
        range: TimeRange,
        event_type: Option<&EventType>,
    ) -> Result<Vec<ActivityEvent>> {
        query::events_in_range(&self.client, scope, range, event_type).await
    }
}
