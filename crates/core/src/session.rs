//! Login sessions and their lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{OrgId, SessionId, UserId};

/// How a session came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    /// Explicit login.
    #[default]
    Login,
    /// Recreated by a heartbeat after the previous session was closed.
    Heartbeat,
}

impl SessionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Heartbeat => "heartbeat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "login" => Some(Self::Login),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Why a session ended. An open session has no end reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Logout,
    Inactive,
    Expired,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "logout" => Some(Self::Logout),
            "inactive" => Some(Self::Inactive),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// One login interval for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub organization_id: Option<OrgId>,
    pub login_at: DateTime<Utc>,
    /// `None` while the session is open.
    pub logout_at: Option<DateTime<Utc>>,
    pub last_active_at: DateTime<Utc>,
    pub current_page: Option<String>,
    pub created_by: SessionSource,
    pub end_reason: Option<EndReason>,
    /// Whole seconds, set when the session is closed.
    pub duration_secs: Option<i64>,
    pub ip: String,
    pub user_agent: Option<String>,
}

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: UserId,
    pub organization_id: Option<OrgId>,
    pub ip: String,
    pub user_agent: Option<String>,
    pub source: SessionSource,
    /// Page the session starts on.
    pub page: Option<String>,
}

impl NewSession {
    pub fn login(user_id: UserId, organization_id: Option<OrgId>, ip: impl Into<String>) -> Self {
        Self {
            user_id,
            organization_id,
            ip: ip.into(),
            user_agent: None,
            source: SessionSource::Login,
            page: None,
        }
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn with_source(mut self, source: SessionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into()).filter(|p| !p.is_empty());
        self
    }
}

/// Result of a conditional heartbeat update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeartbeatOutcome {
    /// False when the session was already closed (or unknown).
    pub applied: bool,
    /// The page stored on the session immediately before this update.
    pub previous_page: Option<String>,
}

/// The most recently active open session of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub last_active_at: DateTime<Utc>,
    pub current_page: Option<String>,
}

impl Session {
    /// Opens a new session at `now`.
    pub fn open(new: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            organization_id: new.organization_id,
            login_at: now,
            logout_at: None,
            last_active_at: now,
            current_page: new.page,
            created_by: new.source,
            end_reason: None,
            duration_secs: None,
            ip: new.ip,
            user_agent: new.user_agent,
        }
    }

    pub fn is_open(&self) -> bool {
        self.logout_at.is_none()
    }

    /// Logout time if closed, otherwise `now`.
    pub fn effective_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.logout_at.unwrap_or(now)
    }

    /// Closed sessions: logout - login. Open sessions: now - login.
    /// Never negative.
    pub fn duration_at(&self, now: DateTime<Utc>) -> Duration {
        let d = self.effective_end(now) - self.login_at;
        d.max(Duration::zero())
    }

    /// Whether `at` falls in `[login, effective_end)`.
    pub fn contains(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at >= self.login_at && at < self.effective_end(now)
    }

    /// Records a heartbeat if the session is still open.
    pub fn touch(&mut self, page: Option<&str>, now: DateTime<Utc>) -> HeartbeatOutcome {
        if !self.is_open() {
            return HeartbeatOutcome::default();
        }
        let previous_page = self.current_page.clone();
        self.last_active_at = now;
        if let Some(page) = page {
            self.current_page = Some(page.to_string());
        }
        HeartbeatOutcome {
            applied: true,
            previous_page,
        }
    }

    /// Explicit close: logout = `now`, duration = now - login.
    /// Returns false if the session was already closed.
    pub fn close_at(&mut self, reason: EndReason, now: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.logout_at = Some(now);
        self.end_reason = Some(reason);
        self.duration_secs = Some(self.duration_at(now).num_seconds());
        true
    }

    /// System close (reaper, force-close): the session ends at its last
    /// heartbeat so that logout - login equals the stored duration.
    pub fn close_as_inactive(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        let end = self.last_active_at.max(self.login_at);
        self.logout_at = Some(end);
        self.end_reason = Some(EndReason::Inactive);
        self.duration_secs = Some((end - self.login_at).num_seconds());
        true
    }
}
