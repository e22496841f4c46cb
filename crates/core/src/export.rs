//! Flat rows for session and event exports. Encoding them (CSV, JSON) is the
//! caller's business.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::MemberProfile;
use crate::event::ActivityEvent;
use crate::session::Session;
use crate::{OrgId, SessionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExportRow {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub user_name: String,
    pub email: String,
    pub organization: String,
    pub group: String,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
    /// Empty while the session is open.
    pub end_reason: String,
    pub duration_secs: i64,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventExportRow {
    pub event_id: uuid::Uuid,
    pub user_id: UserId,
    pub user_name: String,
    pub session_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub resource_name: String,
    pub page_path: String,
    pub details: serde_json::Value,
}

/// Missing profiles and organization names leave the fields empty.
pub fn session_rows(
    sessions: &[Session],
    profiles: &HashMap<UserId, MemberProfile>,
    org_names: &HashMap<OrgId, String>,
    now: DateTime<Utc>,
) -> Vec<SessionExportRow> {
    sessions
        .iter()
        .map(|s| {
            let profile = profiles.get(&s.user_id);
            SessionExportRow {
                session_id: s.id,
                user_id: s.user_id,
                user_name: profile.map(|p| p.display_name.clone()).unwrap_or_default(),
                email: profile.map(|p| p.email.clone()).unwrap_or_default(),
                organization: s
                    .organization_id
                    .and_then(|o| org_names.get(&o).cloned())
                    .unwrap_or_default(),
                group: profile.map(|p| p.group_name.clone()).unwrap_or_default(),
                login_at: s.login_at,
                logout_at: s.logout_at,
                end_reason: s
                    .end_reason
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_default(),
                duration_secs: s
                    .duration_secs
                    .unwrap_or_else(|| s.duration_at(now).num_seconds()),
                ip: s.ip.clone(),
            }
        })
        .collect()
}

pub fn event_rows(
    events: &[ActivityEvent],
    profiles: &HashMap<UserId, MemberProfile>,
) -> Vec<EventExportRow> {
    events
        .iter()
        .map(|e| EventExportRow {
            event_id: e.id,
            user_id: e.user_id,
            user_name: profiles
                .get(&e.user_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default(),
            session_id: e.session_id,
            timestamp: e.timestamp,
            event_type: e.event_type.to_string(),
            resource_name: e.resource_name.clone().unwrap_or_default(),
            page_path: e.page_path.clone().unwrap_or_default(),
            details: e.details.clone(),
        })
        .collect()
}
