//! Activity event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{EventId, OrgId, ResourceId, SessionId, UserId};

/// Maximum serialized size of an event's detail map.
pub const MAX_DETAILS_BYTES: usize = 16 * 1024;

/// Detail key carried by `resource_return` events.
pub const TIME_AWAY_SECS: &str = "time_away_secs";

/// Kind of activity. Unknown kinds are preserved as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    PageView,
    ResourceView,
    ResourceLaunch,
    ResourceReturn,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PageView => "page_view",
            Self::ResourceView => "resource_view",
            Self::ResourceLaunch => "resource_launch",
            Self::ResourceReturn => "resource_return",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "page_view" => Self::PageView,
            "resource_view" => Self::ResourceView,
            "resource_launch" => Self::ResourceLaunch,
            "resource_return" => Self::ResourceReturn,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, recorded activity event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: EventId,
    pub user_id: UserId,
    /// Best-effort link; may be missing or point at a closed session.
    pub session_id: Option<SessionId>,
    pub organization_id: Option<OrgId>,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub resource_id: Option<ResourceId>,
    pub resource_name: Option<String>,
    pub page_path: Option<String>,
    /// Free-form detail map, `Null` when absent.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ActivityEvent {
    /// Seconds spent away on a launched resource, for `resource_return` events.
    pub fn time_away_secs(&self) -> Option<i64> {
        let v = self.details.get(TIME_AWAY_SECS)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    pub fn resource_label(&self) -> &str {
        self.resource_name.as_deref().unwrap_or_default()
    }
}

fn validate_details(details: &serde_json::Value) -> Result<(), ValidationError> {
    if details.is_null() {
        return Ok(());
    }
    if !details.is_object() {
        let mut err = ValidationError::new("details_not_object");
        err.message = Some("details must be a JSON object".into());
        return Err(err);
    }

    let size = serde_json::to_vec(details).map(|v| v.len()).unwrap_or(0);
    if size > MAX_DETAILS_BYTES {
        let mut err = ValidationError::new("details_too_large");
        err.message = Some(
            format!(
                "details {}KB exceeds {}KB limit",
                size / 1024,
                MAX_DETAILS_BYTES / 1024
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// An event to record. The timestamp defaults to the recording instant.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewEvent {
    pub event_type: EventType,
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub organization_id: Option<OrgId>,
    pub timestamp: Option<DateTime<Utc>>,
    pub resource_id: Option<ResourceId>,
    #[validate(length(max = 500))]
    pub resource_name: Option<String>,
    #[validate(length(max = 2000))]
    pub page_path: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_details"))]
    pub details: serde_json::Value,
}

impl NewEvent {
    pub fn new(event_type: EventType, user_id: UserId) -> Self {
        Self {
            event_type,
            user_id,
            session_id: None,
            organization_id: None,
            timestamp: None,
            resource_id: None,
            resource_name: None,
            page_path: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn in_organization(mut self, org: Option<OrgId>) -> Self {
        self.organization_id = org;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_resource(mut self, id: ResourceId, name: impl Into<String>) -> Self {
        self.resource_id = Some(id);
        self.resource_name = Some(name.into());
        self
    }

    pub fn with_page(mut self, path: impl Into<String>) -> Self {
        self.page_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Assigns identity and timestamp.
    pub fn into_event(self, now: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            session_id: self.session_id,
            organization_id: self.organization_id,
            timestamp: self.timestamp.unwrap_or(now),
            event_type: self.event_type,
            resource_id: self.resource_id,
            resource_name: self.resource_name,
            page_path: self.page_path,
            details: self.details,
        }
    }
}
