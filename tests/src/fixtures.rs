//! Test fixtures: fixed instants, members, requests and events.

use chrono::{DateTime, TimeZone, Utc};
use presence_core::{EventType, MemberProfile, NewEvent, OrgId, ResourceId, SessionId, UserId};
use tracker::{Heartbeat, LoginRequest};
use uuid::Uuid;

/// 2024-03-04 (a Monday) at `h:m:s` UTC.
pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
}

/// A member profile with a unique id.
pub fn member(name: &str, org: Option<OrgId>) -> MemberProfile {
    let user_id = Uuid::new_v4();
    MemberProfile {
        login_id: name.to_lowercase(),
        email: format!("{}@example.org", name.to_lowercase()),
        organization_id: org,
        group_name: "Period 1".to_string(),
        role: "student".to_string(),
        ..MemberProfile::new(user_id, name)
    }
}

pub fn login(user: UserId, org: Option<OrgId>) -> LoginRequest {
    LoginRequest {
        user_id: user,
        organization_id: org,
        ip: "203.0.113.7".to_string(),
        user_agent: Some("Mozilla/5.0 (Test)".to_string()),
    }
}

pub fn heartbeat(user: UserId, session: Option<SessionId>, page: Option<&str>) -> Heartbeat {
    Heartbeat {
        session_id: session,
        user_id: user,
        organization_id: None,
        page: page.map(str::to_string),
        ip: "203.0.113.7".to_string(),
        user_agent: None,
    }
}

/// A resource event linked to `session`, stamped at `ts`.
pub fn resource_event(
    event_type: EventType,
    user: UserId,
    session: SessionId,
    resource: (ResourceId, &str),
    ts: DateTime<Utc>,
) -> NewEvent {
    NewEvent::new(event_type, user)
        .in_session(session)
        .with_resource(resource.0, resource.1)
        .at(ts)
}

/// A page view stamped at `ts`, optionally carrying a session link.
pub fn page_view(user: UserId, session: Option<SessionId>, path: &str, ts: DateTime<Utc>) -> NewEvent {
    let event = NewEvent::new(EventType::PageView, user).with_page(path).at(ts);
    match session {
        Some(id) => event.in_session(id),
        None => event,
    }
}
