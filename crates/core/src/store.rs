//! Storage traits for sessions and activity events.
//!
//! Mutating session operations receive the instant to use from the caller,
//! so every backend behaves the same under a manual clock. Each conditional
//! update must be atomic per session: "update only if still open".

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{ActivityEvent, EventType};
use crate::session::{ActiveSession, EndReason, HeartbeatOutcome, NewSession, Session};
use crate::{OrgId, Result, SessionId, UserId};

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[now - lookback, now]`, with `now` itself included.
    pub fn trailing(now: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: now - lookback,
            end: now + Duration::milliseconds(1),
        }
    }

    /// Whole UTC days from `from` through `to`, both inclusive.
    pub fn days(from: chrono::NaiveDate, to: chrono::NaiveDate) -> Self {
        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = (to.and_time(NaiveTime::MIN) + Duration::days(1)).and_utc();
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Which users a query covers. An empty scope covers everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub user_ids: Option<Vec<UserId>>,
    pub organization_id: Option<OrgId>,
}

impl Scope {
    pub fn users(ids: Vec<UserId>) -> Self {
        Self {
            user_ids: Some(ids),
            organization_id: None,
        }
    }

    pub fn organization(org: OrgId) -> Self {
        Self {
            user_ids: None,
            organization_id: Some(org),
        }
    }

    /// A user list that is present but empty matches nothing.
    pub fn is_empty_selection(&self) -> bool {
        matches!(&self.user_ids, Some(ids) if ids.is_empty())
    }

    pub fn matches(&self, user: UserId, org: Option<OrgId>) -> bool {
        let user_ok = self
            .user_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&user));
        let org_ok = self.organization_id.map_or(true, |o| org == Some(o));
        user_ok && org_ok
    }
}

/// Offset/limit window. Page size policy belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Force-closes the user's open sessions (reason inactive), then opens
    /// a new one at `now`.
    async fn create(&self, new: NewSession, now: DateTime<Utc>) -> Result<Session>;

    /// Sets last-active (and the page, if given) only if the session is open.
    async fn update_heartbeat(
        &self,
        id: SessionId,
        page: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome>;

    /// Closes an open session at `now`. Returns false if it was not open.
    async fn close(&self, id: SessionId, reason: EndReason, now: DateTime<Utc>) -> Result<bool>;

    /// Closes every open session whose last-active is before `cutoff`.
    async fn close_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn get(&self, id: SessionId) -> Result<Option<Session>>;

    /// Per user, the open session with the latest last-active.
    async fn active_for_users(&self, users: &[UserId]) -> Result<HashMap<UserId, ActiveSession>>;

    /// Newest first by login.
    async fn by_user(&self, user: UserId, page: Page) -> Result<Vec<Session>>;

    /// Sessions with login at or after `since`, newest first, capped.
    async fn by_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Session>>;

    /// Newest first by login.
    async fn by_organization(&self, org: OrgId, page: Page) -> Result<Vec<Session>>;

    /// Open sessions in the organization active at or after `active_since`.
    async fn count_active_in_organization(
        &self,
        org: OrgId,
        active_since: DateTime<Utc>,
    ) -> Result<u64>;

    /// Sessions whose login falls in `range`, newest first.
    async fn in_range(&self, scope: &Scope, range: TimeRange) -> Result<Vec<Session>>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn record(&self, event: ActivityEvent) -> Result<()>;

    /// Oldest first.
    async fn by_session(&self, id: SessionId) -> Result<Vec<ActivityEvent>>;

    /// Newest first.
    async fn by_user(&self, user: UserId, limit: u64) -> Result<Vec<ActivityEvent>>;

    /// Oldest first.
    async fn by_user_in_range(&self, user: UserId, range: TimeRange) -> Result<Vec<ActivityEvent>>;

    /// Newest first.
    async fn by_organization(&self, org: OrgId, limit: u64) -> Result<Vec<ActivityEvent>>;

    /// Per user, the newest event of one of `types` at or after `since`.
    async fn latest_for_users(
        &self,
        users: &[UserId],
        types: &[EventType],
        since: DateTime<Utc>,
    ) -> Result<HashMap<UserId, ActivityEvent>>;

    async fn count_by_type(
        &self,
        user: UserId,
        event_type: &EventType,
        range: TimeRange,
    ) -> Result<u64>;

    /// Newest first, optionally restricted to one type.
    async fn in_range(
        &self,
        scope: &Scope,
        range: TimeRange,
        event_type: Option<&EventType>,
    ) -> Result<Vec<ActivityEvent>>;
}
