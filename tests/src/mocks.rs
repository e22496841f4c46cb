//! Mock implementations for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use presence_core::{
    ActivityEvent, Error, EventStore, EventType, MemoryStore, OrgId, Result, Scope, SessionId,
    TimeRange, UserId,
};

/// Event store over a [`MemoryStore`] that can be switched into failure mode.
///
/// Reads and writes go to the same in-memory events the session side uses,
/// so a test can break only the event path while sessions keep working.
#[derive(Clone)]
pub struct FlakyEventStore {
    inner: Arc<MemoryStore>,
    /// Simulate failures if set.
    should_fail: Arc<Mutex<bool>>,
}

impl FlakyEventStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if *self.should_fail.lock() {
            return Err(Error::store(op, "mock event store failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for FlakyEventStore {
    async fn record(&self, event: ActivityEvent) -> Result<()> {
        self.check("events.record")?;
        self.inner.record(event).await
    }

    async fn by_session(&self, id: SessionId) -> Result<Vec<ActivityEvent>> {
        self.check("events.by_session")?;
        self.inner.by_session(id).await
    }

    async fn by_user(&self, user: UserId, limit: u64) -> Result<Vec<ActivityEvent>> {
        self.check("events.by_user")?;
        EventStore::by_user(self.inner.as_ref(), user, limit).await
    }

    async fn by_user_in_range(&self, user: UserId, range: TimeRange) -> Result<Vec<ActivityEvent>> {
        self.check("events.by_user_in_range")?;
        self.inner.by_user_in_range(user, range).await
    }

    async fn by_organization(&self, org: OrgId, limit: u64) -> Result<Vec<ActivityEvent>> {
        self.check("events.by_organization")?;
        EventStore::by_organization(self.inner.as_ref(), org, limit).await
    }

    async fn latest_for_users(
        &self,
        users: &[UserId],
        types: &[EventType],
        since: DateTime<Utc>,
    ) -> Result<HashMap<UserId, ActivityEvent>> {
        self.check("events.latest_for_users")?;
        self.inner.latest_for_users(users, types, since).await
    }

    async fn count_by_type(
        &self,
        user: UserId,
        event_type: &EventType,
        range: TimeRange,
    ) -> Result<u64> {
        self.check("events.count_by_type")?;
        self.inner.count_by_type(user, event_type, range).await
    }

    async fn in_range(
        &self,
        scope: &Scope,
        range: TimeRange,
        event_type: Option<&EventType>,
    ) -> Result<Vec<ActivityEvent>> {
        self.check("events.in_range")?;
        EventStore::in_range(self.inner.as_ref(), scope, range, event_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::NewEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_flaky_store_passes_through() {
        let inner = Arc::new(MemoryStore::new());
        let store = FlakyEventStore::new(inner.clone());

        let event = NewEvent::new(EventType::PageView, Uuid::new_v4()).into_event(Utc::now());
        store.record(event).await.unwrap();
        assert_eq!(inner.event_count(), 1);
    }

    #[tokio::test]
    async fn test_flaky_store_failure_mode() {
        let store = FlakyEventStore::new(Arc::new(MemoryStore::new()));
        store.set_should_fail(true);

        let event = NewEvent::new(EventType::PageView, Uuid::new_v4()).into_event(Utc::now());
        let err = store.record(event).await.unwrap_err();
        assert_eq!(err.error_code(), Some("STORE_001"));
    }
}
