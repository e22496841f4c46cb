//! BSON shape of a stored session.

use chrono::{DateTime, Utc};
use mongodb::bson::{self, Bson};
use presence_core::{EndReason, Error, Result, Session, SessionSource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub login_at: bson::DateTime,
    /// Stored as an explicit null while open so `{logout_at: null}` matches.
    #[serde(default)]
    pub logout_at: Option<bson::DateTime>,
    pub last_active_at: bson::DateTime,
    #[serde(default)]
    pub current_page: Option<String>,
    pub created_by: String,
    #[serde(default)]
    pub end_reason: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

pub fn to_bson_time(at: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(at.timestamp_millis())
}

pub fn from_bson_time(op: &'static str, at: bson::DateTime) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())
        .ok_or_else(|| Error::store(op, format!("timestamp out of range: {}", at)))
}

pub fn parse_id(op: &'static str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::store(op, format!("bad id {:?}: {}", raw, e)))
}

/// Ids as a BSON array for `$in` filters.
pub fn id_array(ids: &[Uuid]) -> Bson {
    Bson::Array(ids.iter().map(|id| Bson::String(id.to_string())).collect())
}

impl From<&Session> for SessionDoc {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.to_string(),
            user_id: s.user_id.to_string(),
            organization_id: s.organization_id.map(|o| o.to_string()),
            login_at: to_bson_time(s.login_at),
            logout_at: s.logout_at.map(to_bson_time),
            last_active_at: to_bson_time(s.last_active_at),
            current_page: s.current_page.clone(),
            created_by: s.created_by.as_str().to_string(),
            end_reason: s.end_reason.map(|r| r.as_str().to_string()),
            duration_secs: s.duration_secs,
            ip: s.ip.clone(),
            user_agent: s.user_agent.clone(),
        }
    }
}

impl TryFrom<SessionDoc> for Session {
    type Error = Error;

    fn try_from(doc: SessionDoc) -> Result<Self> {
        const OP: &str = "sessions.decode";
        Ok(Session {
            id: parse_id(OP, &doc.id)?,
            user_id: parse_id(OP, &doc.user_id)?,
            organization_id: doc
                .organization_id
                .as_deref()
                .map(|o| parse_id(OP, o))
                .transpose()?,
            login_at: from_bson_time(OP, doc.login_at)?,
            logout_at: doc
                .logout_at
                .map(|t| from_bson_time(OP, t))
                .transpose()?,
            last_active_at: from_bson_time(OP, doc.last_active_at)?,
            current_page: doc.current_page.filter(|p| !p.is_empty()),
            // Older rows may carry an unknown source; treat them as logins.
            created_by: SessionSource::parse(&doc.created_by).unwrap_or_default(),
            end_reason: doc.end_reason.as_deref().and_then(EndReason::parse),
            duration_secs: doc.duration_secs,
            ip: doc.ip,
            user_agent: doc.user_agent,
        })
    }
}
