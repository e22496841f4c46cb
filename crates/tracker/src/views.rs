//! Read-side views: presence dashboard, member timelines, statistics and
//! exports. Everything here is recomputed from the stores on each call.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use chrono_tz::Tz;
use presence_core::aggregate::{self, AggregateStats, RangeStats};
use presence_core::export::{self, EventExportRow, SessionExportRow};
use presence_core::format::{format_duration, safe_div};
use presence_core::presence::{self, classify};
use presence_core::timeline::{build_timeline, SessionBlock};
use presence_core::{
    ActivityEvent, EventType, MemberProfile, OrgId, Page, Presence, PresenceRow, Result, Scope,
    Session, SessionId, TimeRange, UserId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::{Backend, Tracker};

/// Timeline page for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTimeline {
    pub user_id: UserId,
    pub total_sessions: u64,
    pub total_time: String,
    pub avg_session_minutes: i64,
    pub resource_launches: u64,
    pub sessions: Vec<SessionBlock>,
}

impl Tracker {
    /// Presence of a single user.
    pub async fn presence(&self, user: UserId) -> Result<Presence> {
        let now = self.clock.now();
        let active = self
            .guarded(
                "sessions.active_for_users",
                Backend::Sessions,
                user,
                self.sessions.active_for_users(&[user]),
            )
            .await?;
        Ok(classify(now, active.get(&user).map(|a| a.last_active_at)))
    }

    /// Dashboard rows for the given members, in input order.
    ///
    /// Session state failures fail the call. Organization names and the
    /// current-resource lookup degrade to empty values instead.
    pub async fn presence_rows(&self, members: &[MemberProfile]) -> Result<Vec<PresenceRow>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let ids: Vec<UserId> = members.iter().map(|m| m.user_id).collect();
        let scope = Scope::users(ids.clone());

        let active = self
            .guarded(
                "sessions.active_for_users",
                Backend::Sessions,
                ids.len(),
                self.sessions.active_for_users(&ids),
            )
            .await?;

        let today = TimeRange::new(aggregate::utc_midnight(now), now + Duration::milliseconds(1));
        let sessions_today = self
            .guarded(
                "sessions.in_range",
                Backend::Sessions,
                ids.len(),
                self.sessions.in_range(&scope, today),
            )
            .await?;
        let minutes = aggregate::minutes_today(&sessions_today, now);

        let online: Vec<UserId> = ids
            .iter()
            .copied()
            .filter(|id| active.contains_key(id))
            .collect();
        let since = now - Duration::minutes(self.config.resource_lookback_minutes);
        let resource_types = [EventType::ResourceView, EventType::ResourceLaunch];
        let recent: HashMap<UserId, ActivityEvent> = if online.is_empty() {
            HashMap::new()
        } else {
            self.lenient(
                "events.latest_for_users",
                self.events.latest_for_users(&online, &resource_types, since),
            )
            .await
        };

        let org_ids: Vec<OrgId> = members
            .iter()
            .filter_map(|m| m.organization_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let org_names: HashMap<OrgId, String> = if org_ids.is_empty() {
            HashMap::new()
        } else {
            self.lenient(
                "directory.organization_names",
                self.directory.organization_names(&org_ids),
            )
            .await
        };

        let rows = members
            .iter()
            .map(|m| {
                let session = active.get(&m.user_id);
                let p = classify(now, session.map(|s| s.last_active_at));
                let activity = presence::current_activity(
                    p.status,
                    session.and_then(|s| s.current_page.as_deref()),
                    recent.get(&m.user_id),
                );
                let org_name = m
                    .organization_id
                    .and_then(|o| org_names.get(&o).cloned())
                    .unwrap_or_default();
                let mins = minutes.get(&m.user_id).copied().unwrap_or(0);
                PresenceRow::build(m, org_name, p, activity, mins)
            })
            .collect();
        Ok(rows)
    }

    /// Sessions of the trailing window with their correlated events.
    pub async fn member_timeline(&self, user: UserId, tz: Tz) -> Result<MemberTimeline> {
        let now = self.clock.now();
        let window = TimeRange::trailing(now, Duration::days(self.config.timeline_window_days));

        let sessions = self
            .guarded(
                "sessions.by_user_since",
                Backend::Sessions,
                user,
                self.sessions
                    .by_user_since(user, window.start, self.config.timeline_max_sessions),
            )
            .await?;
        let events = self
            .guarded(
                "events.by_user_in_range",
                Backend::Events,
                user,
                self.events.by_user_in_range(user, window),
            )
            .await?;
        let launches = self
            .guarded(
                "events.count_by_type",
                Backend::Events,
                user,
                self.events
                    .count_by_type(user, &EventType::ResourceLaunch, window),
            )
            .await?;

        let total_secs: i64 = sessions
            .iter()
            .map(|s| s.duration_at(now).num_seconds())
            .sum();
        let blocks = build_timeline(&sessions, &events, now, tz);
        debug!(
            user_id = %user,
            sessions = sessions.len(),
            events = events.len(),
            "Built member timeline"
        );

        Ok(MemberTimeline {
            user_id: user,
            total_sessions: sessions.len() as u64,
            total_time: format_duration(total_secs),
            avg_session_minutes: safe_div(total_secs / 60, sessions.len() as i64),
            resource_launches: launches,
            sessions: blocks,
        })
    }

    /// Per-user statistics for sessions that logged in within `range`.
    pub async fn range_stats(
        &self,
        scope: &Scope,
        range: TimeRange,
    ) -> Result<HashMap<UserId, RangeStats>> {
        let now = self.clock.now();
        let sessions = self
            .guarded(
                "sessions.in_range",
                Backend::Sessions,
                range.start,
                self.sessions.in_range(scope, range),
            )
            .await?;
        let returns = self
            .guarded(
                "events.in_range",
                Backend::Events,
                range.start,
                self.events
                    .in_range(scope, range, Some(&EventType::ResourceReturn)),
            )
            .await?;
        Ok(aggregate::range_stats(
            &sessions,
            &returns,
            range,
            self.config.class_hours,
            now,
        ))
    }

    /// [`Self::range_stats`] for the current Monday-based week.
    pub async fn weekly_stats(&self, scope: &Scope) -> Result<HashMap<UserId, RangeStats>> {
        let week = aggregate::current_week(self.clock.now());
        self.range_stats(scope, week).await
    }

    pub async fn aggregate(&self, scope: &Scope, range: TimeRange) -> Result<AggregateStats> {
        let now = self.clock.now();
        let sessions = self
            .guarded(
                "sessions.in_range",
                Backend::Sessions,
                range.start,
                self.sessions.in_range(scope, range),
            )
            .await?;
        Ok(aggregate::aggregate(&sessions, now))
    }

    /// The trailing export window ending today (UTC), inclusive.
    pub fn default_export_range(&self) -> TimeRange {
        let today = self.clock.now().date_naive();
        let from = today - Duration::days(self.config.export_default_days - 1);
        TimeRange::days(from, today)
    }

    pub async fn session_export(
        &self,
        scope: &Scope,
        range: Option<TimeRange>,
    ) -> Result<Vec<SessionExportRow>> {
        let now = self.clock.now();
        let range = range.unwrap_or_else(|| self.default_export_range());
        let sessions = self
            .guarded(
                "sessions.in_range",
                Backend::Sessions,
                range.start,
                self.sessions.in_range(scope, range),
            )
            .await?;

        let users = distinct(sessions.iter().map(|s| s.user_id));
        let orgs = distinct(sessions.iter().filter_map(|s| s.organization_id));
        let profiles = self.profiles_for(&users).await;
        let org_names: HashMap<OrgId, String> = if orgs.is_empty() {
            HashMap::new()
        } else {
            self.lenient(
                "directory.organization_names",
                self.directory.organization_names(&orgs),
            )
            .await
        };
        Ok(export::session_rows(&sessions, &profiles, &org_names, now))
    }

    pub async fn event_export(
        &self,
        scope: &Scope,
        range: Option<TimeRange>,
        event_type: Option<EventType>,
    ) -> Result<Vec<EventExportRow>> {
        let range = range.unwrap_or_else(|| self.default_export_range());
        let events = self
            .guarded(
                "events.in_range",
                Backend::Events,
                range.start,
                self.events.in_range(scope, range, event_type.as_ref()),
            )
            .await?;
        let users = distinct(events.iter().map(|e| e.user_id));
        let profiles = self.profiles_for(&users).await;
        Ok(export::event_rows(&events, &profiles))
    }

    async fn profiles_for(&self, users: &[UserId]) -> HashMap<UserId, MemberProfile> {
        if users.is_empty() {
            return HashMap::new();
        }
        self.lenient("directory.profiles", self.directory.profiles(users))
            .await
    }

    pub async fn session(&self, id: SessionId) -> Result<Option<Session>> {
        self.guarded("sessions.get", Backend::Sessions, id, self.sessions.get(id))
            .await
    }

    pub async fn user_sessions(&self, user: UserId, page: Page) -> Result<Vec<Session>> {
        self.guarded(
            "sessions.by_user",
            Backend::Sessions,
            user,
            self.sessions.by_user(user, page),
        )
        .await
    }

    pub async fn organization_sessions(&self, org: OrgId, page: Page) -> Result<Vec<Session>> {
        self.guarded(
            "sessions.by_organization",
            Backend::Sessions,
            org,
            self.sessions.by_organization(org, page),
        )
        .await
    }

    /// Open sessions in an organization that were active within the online
    /// threshold.
    pub async fn online_count(&self, org: OrgId) -> Result<u64> {
        let since = self.clock.now() - Duration::minutes(presence::ONLINE_THRESHOLD_MINUTES);
        self.guarded(
            "sessions.count_active",
            Backend::Sessions,
            org,
            self.sessions.count_active_in_organization(org, since),
        )
        .await
    }

    pub async fn session_events(&self, id: SessionId) -> Result<Vec<ActivityEvent>> {
        self.guarded("events.by_session", Backend::Events, id, self.events.by_session(id))
            .await
    }

    pub async fn recent_events(&self, user: UserId, limit: u64) -> Result<Vec<ActivityEvent>> {
        self.guarded(
            "events.by_user",
            Backend::Events,
            user,
            self.events.by_user(user, limit),
        )
        .await
    }

    pub async fn organization_events(&self, org: OrgId, limit: u64) -> Result<Vec<ActivityEvent>> {
        self.guarded(
            "events.by_organization",
            Backend::Events,
            org,
            self.events.by_organization(org, limit),
        )
        .await
    }

    /// The latest resource event per user within the lookback window.
    pub async fn latest_resource_events(
        &self,
        users: &[UserId],
    ) -> Result<HashMap<UserId, ActivityEvent>> {
        let since = self.clock.now() - Duration::minutes(self.config.resource_lookback_minutes);
        let types = [EventType::ResourceView, EventType::ResourceLaunch];
        self.guarded(
            "events.latest_for_users",
            Backend::Events,
            users.len(),
            self.events.latest_for_users(users, &types, since),
        )
        .await
    }
}

fn distinct<T: Eq + std::hash::Hash + Copy>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.filter(|i| seen.insert(*i)).collect()
}
