//! Session lifecycle and presence, driven through the tracker with a
//! manual clock over the in-memory store.

use chrono::Duration;
use integration_tests::fixtures::{self, at};
use integration_tests::setup::TestContext;
use presence_core::aggregate::{minutes_today, session_minutes, utc_midnight};
use presence_core::{EndReason, EventType, PresenceStatus, Scope, TimeRange};
use uuid::Uuid;

/// Login 09:00, heartbeat 09:05, Online at 09:06:30, Idle at 09:12,
/// reaped at 09:16, Offline at 09:20.
#[tokio::test]
async fn test_login_heartbeat_idle_reap_offline() {
    let ctx = TestContext::new(at(9, 0, 0));
    let user = Uuid::new_v4();

    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();

    ctx.set_time(at(9, 5, 0));
    let hb = ctx
        .tracker
        .heartbeat(fixtures::heartbeat(user, Some(session.id), Some("/member")))
        .await
        .unwrap();
    assert!(!hb.reopened);

    ctx.set_time(at(9, 6, 30));
    assert_eq!(ctx.tracker.presence(user).await.unwrap().status, PresenceStatus::Online);

    ctx.set_time(at(9, 12, 0));
    assert_eq!(ctx.tracker.presence(user).await.unwrap().status, PresenceStatus::Idle);

    ctx.set_time(at(9, 16, 0));
    let closed = ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap();
    assert_eq!(closed, 1);

    ctx.set_time(at(9, 20, 0));
    let presence = ctx.tracker.presence(user).await.unwrap();
    assert_eq!(presence.status, PresenceStatus::Offline);
    assert_eq!(presence.last_active_at, None);

    let stored = ctx.tracker.session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.end_reason, Some(EndReason::Inactive));
    assert_eq!(stored.logout_at, Some(at(9, 5, 0)));
    assert_eq!(stored.duration_secs, Some(300));
}

/// The reaper closes exactly the sessions idle past the cutoff.
#[tokio::test]
async fn test_reaper_respects_cutoff() {
    let ctx = TestContext::new(at(9, 0, 0));
    let stale = Uuid::new_v4();
    let boundary = Uuid::new_v4();
    let fresh = Uuid::new_v4();

    let stale_session = ctx.tracker.login(fixtures::login(stale, None)).await.unwrap();

    ctx.set_time(at(9, 10, 0));
    let boundary_session = ctx.tracker.login(fixtures::login(boundary, None)).await.unwrap();

    ctx.set_time(at(9, 15, 0));
    let fresh_session = ctx.tracker.login(fixtures::login(fresh, None)).await.unwrap();

    // Cutoff is 09:10:00; a last-active exactly at the cutoff stays open.
    ctx.set_time(at(9, 20, 0));
    assert_eq!(ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap(), 1);

    let get = |id| ctx.tracker.session(id);
    assert!(!get(stale_session.id).await.unwrap().unwrap().is_open());
    assert!(get(boundary_session.id).await.unwrap().unwrap().is_open());
    assert!(get(fresh_session.id).await.unwrap().unwrap().is_open());

    // Idempotent.
    assert_eq!(ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_at_most_one_open_session_per_user() {
    let ctx = TestContext::new(at(9, 0, 0));
    let user = Uuid::new_v4();

    let mut last = None;
    for i in 0..5 {
        ctx.advance(Duration::minutes(1));
        if i % 2 == 0 {
            last = Some(ctx.tracker.login(fixtures::login(user, None)).await.unwrap().id);
        } else {
            let hb = ctx
                .tracker
                .heartbeat(fixtures::heartbeat(user, None, Some("/member")))
                .await
                .unwrap();
            last = Some(hb.session_id);
        }
        assert_eq!(ctx.store.open_sessions_for(user), 1);
    }

    let open = ctx.tracker.session(last.unwrap()).await.unwrap().unwrap();
    assert!(open.is_open());
    assert_eq!(ctx.store.session_count(), 5);
}

#[tokio::test]
async fn test_presence_degrades_monotonically() {
    let ctx = TestContext::new(at(9, 0, 0));
    let user = Uuid::new_v4();
    ctx.tracker.login(fixtures::login(user, None)).await.unwrap();

    let mut previous = PresenceStatus::Online;
    for minute in 0..=15 {
        ctx.set_time(at(9, minute, 0));
        let status = ctx.tracker.presence(user).await.unwrap().status;
        let rank = |s: PresenceStatus| match s {
            PresenceStatus::Online => 0,
            PresenceStatus::Idle => 1,
            PresenceStatus::Offline => 2,
        };
        assert!(rank(status) >= rank(previous), "went from {:?} to {:?}", previous, status);
        previous = status;

        let expected = match minute {
            0..=1 => PresenceStatus::Online,
            2..=9 => PresenceStatus::Idle,
            _ => PresenceStatus::Offline,
        };
        assert_eq!(status, expected, "at minute {}", minute);
    }
}

#[tokio::test]
async fn test_event_store_failure_keeps_heartbeat_alive() {
    let ctx = TestContext::new(at(9, 0, 0));
    let user = Uuid::new_v4();
    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();
    ctx.tracker
        .heartbeat(fixtures::heartbeat(user, Some(session.id), Some("/member")))
        .await
        .unwrap();

    ctx.set_events_failure(true);
    ctx.advance(Duration::seconds(30));
    let hb = ctx
        .tracker
        .heartbeat(fixtures::heartbeat(user, Some(session.id), Some("/member/calendar")))
        .await
        .unwrap();
    assert!(!hb.page_view_recorded);

    let err = ctx
        .tracker
        .record_event(fixtures::page_view(user, Some(session.id), "/member", at(9, 0, 30)))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some("STORE_001"));

    // Dashboard rows survive a broken event store.
    let profile = fixtures::member("Ada", None);
    let profile = presence_core::MemberProfile { user_id: user, ..profile };
    let rows = ctx.tracker.presence_rows(&[profile]).await.unwrap();
    assert_eq!(rows[0].status, PresenceStatus::Online);
    assert_eq!(rows[0].current_activity, "Calendar");

    ctx.set_events_failure(false);
    ctx.advance(Duration::seconds(30));
    let hb = ctx
        .tracker
        .heartbeat(fixtures::heartbeat(user, Some(session.id), Some("/member")))
        .await
        .unwrap();
    assert!(hb.page_view_recorded);
}

/// Whole minutes per session add up to the daily total.
#[tokio::test]
async fn test_minutes_today_matches_session_sum() {
    let ctx = TestContext::new(at(8, 0, 0));
    let user = Uuid::new_v4();

    for (login_min, logout_sec) in [(0u32, 119i64), (10, 61), (20, 3599)] {
        ctx.set_time(at(8, login_min, 0));
        let s = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();
        ctx.advance(Duration::seconds(logout_sec));
        ctx.tracker.logout(s.id).await.unwrap();
    }

    let now = at(12, 0, 0);
    ctx.set_time(now);
    let sessions = ctx
        .tracker
        .session_export(&Scope::users(vec![user]), Some(TimeRange::new(utc_midnight(now), now)))
        .await
        .unwrap();
    assert_eq!(sessions.len(), 3);

    let stored = ctx
        .tracker
        .user_sessions(user, presence_core::Page::first(10))
        .await
        .unwrap();
    let per_session: i64 = stored.iter().map(|s| session_minutes(s, now)).sum();
    assert_eq!(per_session, 1 + 1 + 59);
    assert_eq!(minutes_today(&stored, now)[&user], per_session);

    let profile = presence_core::MemberProfile {
        user_id: user,
        ..fixtures::member("Ada", None)
    };
    let rows = ctx.tracker.presence_rows(&[profile]).await.unwrap();
    assert_eq!(rows[0].minutes_today, per_session);
    assert_eq!(rows[0].time_today, "1h 1m");
}

#[tokio::test]
async fn test_resource_activity_label() {
    let ctx = TestContext::new(at(9, 0, 0));
    let org = Uuid::new_v4();
    ctx.directory.insert_organization(org, "North Campus");
    let profile = fixtures::member("Grace", Some(org));
    let user = profile.user_id;

    let session = ctx.tracker.login(fixtures::login(user, Some(org))).await.unwrap();
    ctx.tracker
        .record_event(fixtures::resource_event(
            EventType::ResourceView,
            user,
            session.id,
            (Uuid::new_v4(), "Cell Biology"),
            at(9, 0, 10),
        ))
        .await
        .unwrap();
    ctx.set_time(at(9, 0, 20));
    ctx.tracker
        .heartbeat(fixtures::heartbeat(user, Some(session.id), Some("/member/resources/12")))
        .await
        .unwrap();

    let rows = ctx.tracker.presence_rows(&[profile.clone()]).await.unwrap();
    assert_eq!(rows[0].current_activity, "Viewing \"Cell Biology\"");
    assert_eq!(rows[0].organization_name, "North Campus");
    assert_eq!(rows[0].status_label, "Active");

    // Off the resource page, the page name wins.
    ctx.set_time(at(9, 1, 0));
    ctx.tracker
        .heartbeat(fixtures::heartbeat(user, Some(session.id), Some("/member/calendar")))
        .await
        .unwrap();
    let rows = ctx.tracker.presence_rows(&[profile]).await.unwrap();
    assert_eq!(rows[0].current_activity, "Calendar");
}
