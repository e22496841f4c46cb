//! In-process session and event store.
//!
//! Every conditional update runs under a single lock, which gives the same
//! per-session atomicity the database backends get from their conditional
//! writes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::event::{ActivityEvent, EventType};
use crate::session::{ActiveSession, EndReason, HeartbeatOutcome, NewSession, Session};
use crate::store::{EventStore, Page, Scope, SessionStore, TimeRange};
use crate::{OrgId, Result, SessionId, UserId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    events: Mutex<Vec<ActivityEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session verbatim, bypassing force-close.
    pub fn insert_session(&self, session: Session) {
        self.sessions.lock().insert(session.id, session);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Number of open sessions the user currently has.
    pub fn open_sessions_for(&self, user: UserId) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.user_id == user && s.is_open())
            .count()
    }
}

fn newest_first(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by(|a, b| b.login_at.cmp(&a.login_at).then(b.id.cmp(&a.id)));
    sessions
}

fn paged<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, new: NewSession, now: DateTime<Utc>) -> Result<Session> {
        let mut sessions = self.sessions.lock();
        for s in sessions.values_mut() {
            if s.user_id == new.user_id {
                s.close_as_inactive();
            }
        }
        let session = Session::open(new, now);
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_heartbeat(
        &self,
        id: SessionId,
        page: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome> {
        let mut sessions = self.sessions.lock();
        Ok(sessions
            .get_mut(&id)
            .map(|s| s.touch(page, now))
            .unwrap_or_default())
    }

    async fn close(&self, id: SessionId, reason: EndReason, now: DateTime<Utc>) -> Result<bool> {
        let mut sessions = self.sessions.lock();
        Ok(sessions
            .get_mut(&id)
            .map(|s| s.close_at(reason, now))
            .unwrap_or(false))
    }

    async fn close_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.lock();
        let mut closed = 0;
        for s in sessions.values_mut() {
            if s.is_open() && s.last_active_at < cutoff && s.close_as_inactive() {
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.lock().get(&id).cloned())
    }

    async fn active_for_users(&self, users: &[UserId]) -> Result<HashMap<UserId, ActiveSession>> {
        let sessions = self.sessions.lock();
        let mut out: HashMap<UserId, ActiveSession> = HashMap::new();
        for s in sessions.values() {
            if !s.is_open() || !users.contains(&s.user_id) {
                continue;
            }
            let newer = out
                .get(&s.user_id)
                .map_or(true, |cur| s.last_active_at > cur.last_active_at);
            if newer {
                out.insert(
                    s.user_id,
                    ActiveSession {
                        session_id: s.id,
                        user_id: s.user_id,
                        last_active_at: s.last_active_at,
                        current_page: s.current_page.clone(),
                    },
                );
            }
        }
        Ok(out)
    }

    async fn by_user(&self, user: UserId, page: Page) -> Result<Vec<Session>> {
        let matching: Vec<_> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.user_id == user)
            .cloned()
            .collect();
        Ok(paged(newest_first(matching), page))
    }

    async fn by_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Session>> {
        let matching: Vec<_> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.user_id == user && s.login_at >= since)
            .cloned()
            .collect();
        Ok(paged(newest_first(matching), Page::first(limit)))
    }

    async fn by_organization(&self, org: OrgId, page: Page) -> Result<Vec<Session>> {
        let matching: Vec<_> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.organization_id == Some(org))
            .cloned()
            .collect();
        Ok(paged(newest_first(matching), page))
    }

    async fn count_active_in_organization(
        &self,
        org: OrgId,
        active_since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self
            .sessions
            .lock()
            .values()
            .filter(|s| {
                s.organization_id == Some(org) && s.is_open() && s.last_active_at >= active_since
            })
            .count() as u64)
    }

    async fn in_range(&self, scope: &Scope, range: TimeRange) -> Result<Vec<Session>> {
        let matching: Vec<_> = self
            .sessions
            .lock()
            .values()
            .filter(|s| range.contains(s.login_at) && scope.matches(s.user_id, s.organization_id))
            .cloned()
            .collect();
        Ok(newest_first(matching))
    }
}

fn oldest_first(events: &mut [ActivityEvent]) {
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn record(&self, event: ActivityEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn by_session(&self, id: SessionId) -> Result<Vec<ActivityEvent>> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.session_id == Some(id))
            .cloned()
            .collect();
        oldest_first(&mut out);
        Ok(out)
    }

    async fn by_user(&self, user: UserId, limit: u64) -> Result<Vec<ActivityEvent>> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.user_id == user)
            .cloned()
            .collect();
        oldest_first(&mut out);
        out.reverse();
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn by_user_in_range(&self, user: UserId, range: TimeRange) -> Result<Vec<ActivityEvent>> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.user_id == user && range.contains(e.timestamp))
            .cloned()
            .collect();
        oldest_first(&mut out);
        Ok(out)
    }

    async fn by_organization(&self, org: OrgId, limit: u64) -> Result<Vec<ActivityEvent>> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.organization_id == Some(org))
            .cloned()
            .collect();
        oldest_first(&mut out);
        out.reverse();
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn latest_for_users(
        &self,
        users: &[UserId],
        types: &[EventType],
        since: DateTime<Utc>,
    ) -> Result<HashMap<UserId, ActivityEvent>> {
        let events = self.events.lock();
        let mut out: HashMap<UserId, ActivityEvent> = HashMap::new();
        for e in events.iter() {
            if e.timestamp < since || !users.contains(&e.user_id) || !types.contains(&e.event_type)
            {
                continue;
            }
            let newer = out
                .get(&e.user_id)
                .map_or(true, |cur| e.timestamp > cur.timestamp);
            if newer {
                out.insert(e.user_id, e.clone());
            }
        }
        Ok(out)
    }

    async fn count_by_type(
        &self,
        user: UserId,
        event_type: &EventType,
        range: TimeRange,
    ) -> Result<u64> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| {
                e.user_id == user && &e.event_type == event_type && range.contains(e.timestamp)
            })
            .count() as u64)
    }

    async fn in_range(
        &self,
        scope: &Scope,
        range: TimeRange,
        event_type: Option<&EventType>,
    ) -> Result<Vec<ActivityEvent>> {
        let mut out: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter(|e| {
                range.contains(e.timestamp)
                    && scope.matches(e.user_id, e.organization_id)
                    && event_type.map_or(true, |t| &e.event_type == t)
            })
            .cloned()
            .collect();
        oldest_first(&mut out);
        out.reverse();
        Ok(out)
    }
}
