//! Session timelines.
//!
//! Sessions and events are stored independently and the event's session
//! link is best-effort, so timelines are rebuilt at read time by joining
//! the two streams: direct links first, then timestamp containment, then
//! the open session as a last resort.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::event::{ActivityEvent, EventType};
use crate::format::format_duration;
use crate::session::{EndReason, Session, SessionSource};
use crate::SessionId;

const DATE_FORMAT: &str = "%b %-d, %Y";
const TIME_FORMAT: &str = "%-I:%M %p";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(skip)]
    pub at: DateTime<Utc>,
    pub time_label: String,
    pub timestamp: String,
    /// `login`, `resumed`, `logout`, `last_activity`, or the event type.
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBlock {
    pub session_id: SessionId,
    pub date_label: String,
    pub login_label: String,
    pub logout_label: String,
    pub login_at: String,
    pub logout_at: Option<String>,
    pub duration_label: String,
    pub end_reason_label: String,
    pub is_open: bool,
    /// Newest first.
    pub entries: Vec<TimelineEntry>,
}

/// Events grouped by the session they were attributed to.
#[derive(Debug, Default)]
pub struct Correlation {
    pub by_session: HashMap<SessionId, Vec<ActivityEvent>>,
    /// Events that fit no session, or fell before their session's login.
    pub dropped: usize,
}

/// Attributes each event to at most one session.
///
/// Sessions arrive newest first. Events are routed by their stored link when
/// it names a known session; otherwise by the containing session with the
/// latest login; otherwise to the open session with the latest login, if
/// any. Events earlier than their session's login are discarded.
pub fn correlate(sessions: &[Session], events: &[ActivityEvent], now: DateTime<Utc>) -> Correlation {
    let known: HashSet<SessionId> = sessions.iter().map(|s| s.id).collect();
    let fallback = sessions
        .iter()
        .filter(|s| s.is_open())
        .max_by_key(|s| (s.login_at, s.id));
    let logins: HashMap<SessionId, DateTime<Utc>> =
        sessions.iter().map(|s| (s.id, s.login_at)).collect();

    let mut out = Correlation::default();
    for ev in events {
        let direct = ev.session_id.filter(|id| known.contains(id));
        let target = direct
            .or_else(|| {
                sessions
                    .iter()
                    .filter(|s| s.contains(ev.timestamp, now))
                    .max_by_key(|s| (s.login_at, s.id))
                    .map(|s| s.id)
            })
            .or_else(|| fallback.map(|s| s.id));

        let Some(target) = target else {
            out.dropped += 1;
            continue;
        };
        if logins.get(&target).is_some_and(|login| ev.timestamp < *login) {
            out.dropped += 1;
            continue;
        }
        out.by_session.entry(target).or_default().push(ev.clone());
    }
    out
}

fn time_label(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format(TIME_FORMAT).to_string()
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn entry(at: DateTime<Utc>, tz: Tz, kind: &str, description: String) -> TimelineEntry {
    TimelineEntry {
        at,
        time_label: time_label(at, tz),
        timestamp: iso(at),
        kind: kind.to_string(),
        description,
    }
}

/// Describes an event for the timeline.
pub fn describe_event(ev: &ActivityEvent) -> String {
    match (&ev.event_type, ev.resource_name.as_deref(), ev.page_path.as_deref()) {
        (EventType::ResourceLaunch, Some(name), _) => format!("Launched \"{}\"", name),
        (EventType::ResourceView, Some(name), _) => format!("Viewed \"{}\"", name),
        (EventType::ResourceReturn, Some(name), _) => format!("Returned from \"{}\"", name),
        (EventType::PageView, _, Some(path)) if !path.is_empty() => format!("Viewed {}", path),
        (other, _, _) => other.to_string(),
    }
}

/// Renders one session and its attributed events.
pub fn build_block(
    session: &Session,
    mut events: Vec<ActivityEvent>,
    now: DateTime<Utc>,
    tz: Tz,
) -> SessionBlock {
    events.sort_by_key(|e| e.timestamp);

    let mut entries = Vec::with_capacity(events.len() + 2);
    let (login_kind, login_text) = match session.created_by {
        SessionSource::Login => ("login", "Logged in"),
        SessionSource::Heartbeat => ("resumed", "Session resumed"),
    };
    entries.push(entry(session.login_at, tz, login_kind, login_text.to_string()));

    for ev in &events {
        entries.push(entry(ev.timestamp, tz, ev.event_type.as_str(), describe_event(ev)));
    }

    if let Some(logout) = session.logout_at {
        let text = match session.end_reason {
            Some(EndReason::Inactive) => "Session timed out",
            _ => "Logged out",
        };
        entries.push(entry(logout, tz, "logout", text.to_string()));
    }

    // Stable, so the login entry stays ahead of same-instant events.
    entries.sort_by_key(|e| e.at);
    entries.reverse();

    if session.is_open() {
        let last = session.last_active_at.max(session.login_at);
        entries.insert(0, entry(last, tz, "last_activity", "Last activity".to_string()));
    }

    let local_login = session.login_at.with_timezone(&tz);
    SessionBlock {
        session_id: session.id,
        date_label: local_login.format(DATE_FORMAT).to_string(),
        login_label: time_label(session.login_at, tz),
        logout_label: session
            .logout_at
            .map(|t| time_label(t, tz))
            .unwrap_or_else(|| "(active)".to_string()),
        login_at: iso(session.login_at),
        logout_at: session.logout_at.map(iso),
        duration_label: format_duration(session.duration_at(now).num_seconds()),
        end_reason_label: session
            .end_reason
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| "active".to_string()),
        is_open: session.is_open(),
        entries,
    }
}

/// Correlates and renders every session, preserving the input order.
pub fn build_timeline(
    sessions: &[Session],
    events: &[ActivityEvent],
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<SessionBlock> {
    let mut correlation = correlate(sessions, events, now);
    sessions
        .iter()
        .map(|s| {
            let evs = correlation.by_session.remove(&s.id).unwrap_or_default();
            build_block(s, evs, now, tz)
        })
        .collect()
}
