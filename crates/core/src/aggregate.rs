//! Usage statistics over time windows.
//!
//! Window boundaries are UTC. Minutes are truncated per session before
//! summing, so a user's per-session minutes always add up to their total.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::event::{ActivityEvent, EventType};
use crate::format::{format_duration, format_hour, format_weekday, safe_div};
use crate::session::Session;
use crate::store::TimeRange;
use crate::UserId;

/// Start of the UTC day containing `now`.
pub fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = now.weekday().num_days_from_monday() as i64;
    utc_midnight(now) - Duration::days(days_since_monday)
}

/// The current week, `[Monday 00:00, next Monday 00:00)`.
pub fn current_week(now: DateTime<Utc>) -> TimeRange {
    let start = week_start(now);
    TimeRange::new(start, start + Duration::days(7))
}

/// Whole minutes of a session as of `now`.
pub fn session_minutes(session: &Session, now: DateTime<Utc>) -> i64 {
    session.duration_at(now).num_minutes()
}

/// Minutes per user across sessions that logged in today (UTC).
pub fn minutes_today(sessions: &[Session], now: DateTime<Utc>) -> HashMap<UserId, i64> {
    let midnight = utc_midnight(now);
    let mut out = HashMap::new();
    for s in sessions.iter().filter(|s| s.login_at >= midnight) {
        *out.entry(s.user_id).or_insert(0) += session_minutes(s, now);
    }
    out
}

/// The daily window considered "in class". Logins on weekends or outside
/// `[start_hour, end_hour)` UTC count as outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for ClassHours {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 16,
        }
    }
}

impl ClassHours {
    pub fn is_outside(&self, at: DateTime<Utc>) -> bool {
        let weekend = matches!(at.weekday(), Weekday::Sat | Weekday::Sun);
        let hour = at.hour();
        weekend || hour < self.start_hour || hour >= self.end_hour
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStats {
    pub session_count: u64,
    pub total_minutes: i64,
    pub outside_class: u64,
    pub resource_minutes: i64,
}

/// Per-user statistics for sessions that logged in within `range`, plus the
/// time spent away on resources according to `resource_return` events.
pub fn range_stats(
    sessions: &[Session],
    events: &[ActivityEvent],
    range: TimeRange,
    class_hours: ClassHours,
    now: DateTime<Utc>,
) -> HashMap<UserId, RangeStats> {
    let mut out: HashMap<UserId, RangeStats> = HashMap::new();
    for s in sessions.iter().filter(|s| range.contains(s.login_at)) {
        let stats = out.entry(s.user_id).or_default();
        stats.session_count += 1;
        stats.total_minutes += session_minutes(s, now);
        if class_hours.is_outside(s.login_at) {
            stats.outside_class += 1;
        }
    }

    let mut away_secs: HashMap<UserId, i64> = HashMap::new();
    for ev in events
        .iter()
        .filter(|e| e.event_type == EventType::ResourceReturn && range.contains(e.timestamp))
    {
        if let Some(secs) = ev.time_away_secs() {
            *away_secs.entry(ev.user_id).or_insert(0) += secs.max(0);
        }
    }
    for (user, secs) in away_secs {
        out.entry(user).or_default().resource_minutes = secs / 60;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_sessions: u64,
    pub distinct_users: u64,
    pub total_duration_secs: i64,
    pub total_duration: String,
    pub avg_session_minutes: i64,
    pub peak_hour: Option<u32>,
    pub peak_hour_label: String,
    pub most_active_day: Option<Weekday>,
    pub most_active_day_label: String,
}

/// Most frequent key; ties go to the smallest key.
fn mode<K: Ord + Copy + std::hash::Hash>(counts: &HashMap<K, u64>) -> Option<K> {
    counts
        .iter()
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(kb.cmp(ka)))
        .map(|(k, _)| *k)
}

/// Organization or date-range summary.
pub fn aggregate(sessions: &[Session], now: DateTime<Utc>) -> AggregateStats {
    let mut users = HashSet::new();
    let mut total_secs = 0i64;
    let mut hours: HashMap<u32, u64> = HashMap::new();
    let mut days: HashMap<u32, u64> = HashMap::new();

    for s in sessions {
        users.insert(s.user_id);
        total_secs += s.duration_at(now).num_seconds();
        *hours.entry(s.login_at.hour()).or_insert(0) += 1;
        *days
            .entry(s.login_at.weekday().num_days_from_monday())
            .or_insert(0) += 1;
    }

    let total = sessions.len() as i64;
    let peak_hour = mode(&hours);
    let most_active_day = mode(&days).and_then(|d| Weekday::try_from(d as u8).ok());

    AggregateStats {
        total_sessions: total as u64,
        distinct_users: users.len() as u64,
        total_duration_secs: total_secs,
        total_duration: format_duration(total_secs),
        avg_session_minutes: safe_div(total_secs / 60, total),
        peak_hour,
        peak_hour_label: format_hour(peak_hour),
        most_active_day,
        most_active_day_label: format_weekday(most_active_day),
    }
}
