//! Presence classification and dashboard rows.
//!
//! Status is derived from the elapsed time since the last heartbeat of the
//! user's open session and is recomputed on every read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::MemberProfile;
use crate::event::{ActivityEvent, EventType};
use crate::format::format_minutes;
use crate::UserId;

/// Below this, a user is online.
pub const ONLINE_THRESHOLD_MINUTES: i64 = 2;

/// Below this (and not online), a user is idle.
pub const IDLE_THRESHOLD_MINUTES: i64 = 10;

/// How far back a resource event still counts as the current activity.
pub const CURRENT_RESOURCE_LOOKBACK_MINUTES: i64 = 60;

const RESOURCE_PAGE_PREFIX: &str = "/member/resources/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Offline => "offline",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Online => "Active",
            Self::Idle => "Idle",
            Self::Offline => "Offline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub status: PresenceStatus,
    /// Last heartbeat of the open session, if there is one.
    pub last_active_at: Option<DateTime<Utc>>,
}

/// Classifies a user. `last_active` is `None` when the user has no open
/// session. A heartbeat in the future (clock skew) counts as online.
pub fn classify(now: DateTime<Utc>, last_active: Option<DateTime<Utc>>) -> Presence {
    let Some(last) = last_active else {
        return Presence {
            status: PresenceStatus::Offline,
            last_active_at: None,
        };
    };

    let elapsed = now - last;
    let status = if elapsed < Duration::minutes(ONLINE_THRESHOLD_MINUTES) {
        PresenceStatus::Online
    } else if elapsed < Duration::minutes(IDLE_THRESHOLD_MINUTES) {
        PresenceStatus::Idle
    } else {
        PresenceStatus::Offline
    };

    Presence {
        status,
        last_active_at: Some(last),
    }
}

/// Friendly name for a page path.
pub fn page_display_name(path: &str) -> String {
    let known = match path {
        "/" | "/dashboard" => Some("Dashboard"),
        "/resources" | "/member/resources" => Some("Resources"),
        "/materials" | "/member/materials" => Some("Materials"),
        "/profile" => Some("Profile"),
        "/settings" => Some("Settings"),
        "/about" => Some("About"),
        "/contact" => Some("Contact"),
        "/terms" => Some("Terms"),
        "/privacy" => Some("Privacy"),
        "/activity" => Some("Activity"),
        "/activity/summary" => Some("Activity Summary"),
        _ => None,
    };
    if let Some(name) = known {
        return name.to_string();
    }

    const PREFIXES: [(&str, &str); 4] = [
        ("/member/resources/", "Resources"),
        ("/member/materials/", "Materials"),
        ("/activity/member/", "Activity"),
        ("/activity/export", "Activity Export"),
    ];
    for (prefix, name) in PREFIXES {
        if path.starts_with(prefix) {
            return name.to_string();
        }
    }

    let segment = path
        .trim_start_matches('/')
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Dashboard".to_string(),
    }
}

/// What an online or idle user is doing. Offline users get an empty label.
///
/// `recent_resource` is the user's latest resource view/launch within the
/// lookback window; it wins only while the user is on a resource page.
pub fn current_activity(
    status: PresenceStatus,
    current_page: Option<&str>,
    recent_resource: Option<&ActivityEvent>,
) -> String {
    if status == PresenceStatus::Offline {
        return String::new();
    }

    let page = current_page.filter(|p| !p.is_empty());
    if let (Some(page), Some(ev)) = (page, recent_resource) {
        if page.starts_with(RESOURCE_PAGE_PREFIX) {
            let name = ev.resource_label();
            match ev.event_type {
                EventType::ResourceView => return format!("Viewing \"{}\"", name),
                EventType::ResourceLaunch => return format!("Open \"{}\"", name),
                _ => {}
            }
        }
    }

    match page {
        Some(page) => page_display_name(page),
        None => "Dashboard".to_string(),
    }
}

/// One row of the live presence dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRow {
    pub user_id: UserId,
    pub display_name: String,
    pub login_id: String,
    pub email: String,
    pub organization_name: String,
    pub group_name: String,
    pub role: String,
    pub status: PresenceStatus,
    pub status_label: String,
    pub current_activity: String,
    pub minutes_today: i64,
    pub time_today: String,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl PresenceRow {
    pub fn build(
        profile: &MemberProfile,
        organization_name: String,
        presence: Presence,
        current_activity: String,
        minutes_today: i64,
    ) -> Self {
        Self {
            user_id: profile.user_id,
            display_name: profile.display_name.clone(),
            login_id: profile.login_id.clone(),
            email: profile.email.clone(),
            organization_name,
            group_name: profile.group_name.clone(),
            role: profile.role.clone(),
            status: presence.status,
            status_label: presence.status.label().to_string(),
            current_activity,
            minutes_today,
            time_today: format_minutes(minutes_today),
            last_active_at: presence.last_active_at,
        }
    }
}

/// Status totals shown above the dashboard table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub online: usize,
    pub idle: usize,
    pub offline: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn tally(rows: &[PresenceRow]) -> Self {
        let mut counts = Self::default();
        for row in rows {
            match row.status {
                PresenceStatus::Online => counts.online += 1,
                PresenceStatus::Idle => counts.idle += 1,
                PresenceStatus::Offline => counts.offline += 1,
            }
        }
        counts.total = rows.len();
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowSort {
    #[default]
    Name,
    Group,
    TimeToday,
}

/// Keeps rows with the given status (all rows when `None`) and sorts them.
/// Name and group sort case-insensitively; time sorts longest first.
pub fn filter_and_sort(
    mut rows: Vec<PresenceRow>,
    status: Option<PresenceStatus>,
    sort: RowSort,
) -> Vec<PresenceRow> {
    if let Some(status) = status {
        rows.retain(|r| r.status == status);
    }
    match sort {
        RowSort::Name => rows.sort_by_key(|r| r.display_name.to_lowercase()),
        RowSort::Group => rows.sort_by_key(|r| {
            (r.group_name.to_lowercase(), r.display_name.to_lowercase())
        }),
        RowSort::TimeToday => rows.sort_by(|a, b| {
            b.minutes_today
                .cmp(&a.minutes_today)
                .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
        }),
    }
    rows
}
