//! Session lifecycle and event recording.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use presence_core::{
    ActivityEvent, Clock, EndReason, Error, EventStore, EventType, MemberDirectory, NewEvent,
    NewSession, OrgId, Result, Session, SessionId, SessionSource, SessionStore, SystemClock,
    UserId,
};
use serde::{Deserialize, Serialize};
use telemetry::{metrics, Histogram};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Backend {
    Sessions,
    Events,
}

impl Backend {
    fn latency(&self) -> &'static Histogram {
        match self {
            Self::Sessions => &metrics().session_store_latency_ms,
            Self::Events => &metrics().event_store_latency_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: UserId,
    pub organization_id: Option<OrgId>,
    pub ip: String,
    pub user_agent: Option<String>,
}

/// A periodic liveness ping from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    /// The session the client believes it is in.
    pub session_id: Option<SessionId>,
    pub user_id: UserId,
    pub organization_id: Option<OrgId>,
    pub page: Option<String>,
    pub ip: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResult {
    /// The session the client should use from now on.
    pub session_id: SessionId,
    /// True when the previous session was closed and a new one was opened.
    pub reopened: bool,
    pub page_view_recorded: bool,
}

/// Session and activity tracking over pluggable stores.
///
/// Holds no session state of its own; every read goes to the stores, and
/// every store call is bounded by the configured timeout.
#[derive(Clone)]
pub struct Tracker {
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) events: Arc<dyn EventStore>,
    pub(crate) directory: Arc<dyn MemberDirectory>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: TrackerConfig,
}

impl Tracker {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        events: Arc<dyn EventStore>,
        directory: Arc<dyn MemberDirectory>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            sessions,
            events,
            directory,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    fn op_timeout(&self) -> Duration {
        self.config.op_timeout()
    }

    /// Runs a store call under the operation deadline. Failures are logged
    /// with the operation and its subject and returned as-is.
    pub(crate) async fn guarded<T, F>(
        &self,
        op: &'static str,
        backend: Backend,
        subject: impl Display,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.op_timeout(), fut).await;
        backend.latency().observe_since(start);

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics().store_errors.inc();
                error!(op, subject = %subject, error = %e, "Store operation failed");
                Err(e)
            }
            Err(_) => {
                metrics().store_timeouts.inc();
                let e = Error::timeout(op, self.op_timeout());
                error!(op, subject = %subject, error = %e, "Store operation timed out");
                Err(e)
            }
        }
    }

    /// Like [`Self::guarded`] for side lookups whose failure only blanks a
    /// field: errors are logged and replaced by the default.
    pub(crate) async fn lenient<T, F>(&self, op: &'static str, fut: F) -> T
    where
        T: Default,
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout(), fut).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(op, error = %e, "Lookup failed; continuing without it");
                T::default()
            }
            Err(_) => {
                warn!(op, "Lookup timed out; continuing without it");
                T::default()
            }
        }
    }

    /// Starts a session on explicit login, closing any session the user
    /// still has open.
    pub async fn login(&self, req: LoginRequest) -> Result<Session> {
        let now = self.clock.now();
        let new = NewSession {
            user_id: req.user_id,
            organization_id: req.organization_id,
            ip: req.ip,
            user_agent: req.user_agent,
            source: SessionSource::Login,
            page: None,
        };

        let session = self
            .guarded(
                "sessions.create",
                Backend::Sessions,
                req.user_id,
                self.sessions.create(new, now),
            )
            .await?;

        metrics().sessions_created.inc();
        info!(user_id = %session.user_id, session_id = %session.id, "Session started");
        Ok(session)
    }

    /// Records liveness. A heartbeat for a session that is no longer open
    /// starts a fresh session instead of reviving the old one.
    pub async fn heartbeat(&self, hb: Heartbeat) -> Result<HeartbeatResult> {
        let now = self.clock.now();
        let page = hb.page.as_deref().filter(|p| !p.is_empty());

        if let Some(id) = hb.session_id {
            let outcome = self
                .guarded(
                    "sessions.heartbeat",
                    Backend::Sessions,
                    id,
                    self.sessions.update_heartbeat(id, page, now),
                )
                .await?;

            if outcome.applied {
                metrics().heartbeats_applied.inc();
                let recorded = match (page, outcome.previous_page.as_deref()) {
                    (Some(page), Some(prev)) if !prev.is_empty() && page != prev => {
                        self.record_page_change(&hb, id, page).await
                    }
                    _ => false,
                };
                return Ok(HeartbeatResult {
                    session_id: id,
                    reopened: false,
                    page_view_recorded: recorded,
                });
            }

            metrics().heartbeats_missed.inc();
            debug!(session_id = %id, user_id = %hb.user_id, "Heartbeat for closed session");
        }

        let new = NewSession {
            user_id: hb.user_id,
            organization_id: hb.organization_id,
            ip: hb.ip.clone(),
            user_agent: hb.user_agent.clone(),
            source: SessionSource::Heartbeat,
            page: page.map(str::to_string),
        };
        let session = self
            .guarded(
                "sessions.create",
                Backend::Sessions,
                hb.user_id,
                self.sessions.create(new, now),
            )
            .await?;

        metrics().sessions_reopened.inc();
        info!(
            user_id = %session.user_id,
            session_id = %session.id,
            previous = ?hb.session_id,
            "Session reopened from heartbeat"
        );
        Ok(HeartbeatResult {
            session_id: session.id,
            reopened: true,
            page_view_recorded: false,
        })
    }

    /// Best effort: a failed page view never fails the heartbeat.
    async fn record_page_change(&self, hb: &Heartbeat, session: SessionId, page: &str) -> bool {
        let event = NewEvent::new(EventType::PageView, hb.user_id)
            .in_session(session)
            .in_organization(hb.organization_id)
            .with_page(page);

        match self.record_event(event).await {
            Ok(_) => {
                metrics().page_views_derived.inc();
                true
            }
            Err(e) => {
                warn!(session_id = %session, error = %e, "Failed to record page view");
                false
            }
        }
    }

    /// Explicit logout. Returns false if the session was already closed.
    pub async fn logout(&self, session_id: SessionId) -> Result<bool> {
        self.end_session(session_id, EndReason::Logout).await
    }

    pub async fn end_session(&self, session_id: SessionId, reason: EndReason) -> Result<bool> {
        let now = self.clock.now();
        let closed = self
            .guarded(
                "sessions.close",
                Backend::Sessions,
                session_id,
                self.sessions.close(session_id, reason, now),
            )
            .await?;

        if closed {
            metrics().sessions_closed.inc();
            info!(session_id = %session_id, reason = reason.as_str(), "Session closed");
        }
        Ok(closed)
    }

    /// Validates and appends an event. The event is not checked against the
    /// session store.
    pub async fn record_event(&self, event: NewEvent) -> Result<ActivityEvent> {
        if let Err(e) = event.validate() {
            metrics().events_rejected.inc();
            return Err(e.into());
        }

        let event = event.into_event(self.clock.now());
        self.guarded(
            "events.record",
            Backend::Events,
            event.user_id,
            self.events.record(event.clone()),
        )
        .await?;

        metrics().events_recorded.inc();
        debug!(
            user_id = %event.user_id,
            event_type = %event.event_type,
            "Recorded activity event"
        );
        Ok(event)
    }

    /// Closes every open session idle for at least `threshold`.
    pub async fn reap_inactive(&self, threshold: chrono::Duration) -> Result<u64> {
        let cutoff = self.clock.now() - threshold;
        let closed = self
            .guarded(
                "sessions.close_inactive",
                Backend::Sessions,
                cutoff,
                self.sessions.close_inactive(cutoff),
            )
            .await?;

        metrics().sessions_reaped.inc_by(closed);
        if closed > 0 {
            info!(count = closed, cutoff = %cutoff, "Closed inactive sessions");
        }
        Ok(closed)
    }
}
