//! The tracker over real MongoDB and ClickHouse.
//!
//! Requires Docker to be running for testcontainers:
//! `cargo test -p integration-tests --test storage_e2e -- --ignored`

use std::sync::Arc;

use chrono::Duration;
use clickhouse_client::query::{count_all_events, truncate_events};
use integration_tests::fixtures::{self, at};
use integration_tests::setup::ExternalContext;
use presence_core::{EndReason, EventType, Page, PresenceStatus, Scope, SessionSource};
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_session_lifecycle_in_mongo() {
    let ctx = ExternalContext::new(at(9, 0, 0)).await;
    let user = Uuid::new_v4();
    let org = Uuid::new_v4();

    let first = ctx.tracker.login(fixtures::login(user, Some(org))).await.unwrap();
    ctx.clock.set(at(9, 2, 0));
    ctx.tracker
        .heartbeat(fixtures::heartbeat(user, Some(first.id), Some("/member")))
        .await
        .unwrap();

    // A second login force-closes the first at its last heartbeat.
    ctx.clock.set(at(9, 4, 0));
    let second = ctx.tracker.login(fixtures::login(user, Some(org))).await.unwrap();
    let closed = ctx.tracker.session(first.id).await.unwrap().unwrap();
    assert_eq!(closed.end_reason, Some(EndReason::Inactive));
    assert_eq!(closed.logout_at, Some(at(9, 2, 0)));
    assert_eq!(closed.duration_secs, Some(120));

    assert_eq!(ctx.tracker.online_count(org).await.unwrap(), 1);
    assert_eq!(ctx.tracker.presence(user).await.unwrap().status, PresenceStatus::Online);

    // Reaper, then a heartbeat on the dead session opens a new one.
    ctx.clock.set(at(9, 20, 0));
    assert_eq!(ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap(), 1);
    assert_eq!(ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap(), 0);

    let hb = ctx
        .tracker
        .heartbeat(fixtures::heartbeat(user, Some(second.id), Some("/member/calendar")))
        .await
        .unwrap();
    assert!(hb.reopened);
    let resumed = ctx.tracker.session(hb.session_id).await.unwrap().unwrap();
    assert_eq!(resumed.created_by, SessionSource::Heartbeat);
    assert_eq!(resumed.current_page.as_deref(), Some("/member/calendar"));

    let history = ctx.tracker.user_sessions(user, Page::first(10)).await.unwrap();
    let ids: Vec<Uuid> = history.iter().map(|s| s.id).collect();
    assert_eq!(ids, [hb.session_id, second.id, first.id]);

    assert!(ctx.tracker.logout(hb.session_id).await.unwrap());
    assert!(!ctx.tracker.logout(hb.session_id).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_concurrent_logins_leave_one_open_session_in_mongo() {
    let ctx = Arc::new(ExternalContext::new(at(9, 0, 0)).await);
    let user = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.tracker.login(fixtures::login(user, None)).await.unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let history = ctx.tracker.user_sessions(user, Page::first(50)).await.unwrap();
    assert_eq!(history.len(), 16);
    let open: Vec<_> = history.iter().filter(|s| s.is_open()).collect();
    assert_eq!(open.len(), 1);
    // Newest by (login_at, id) survives.
    let newest = history.iter().map(|s| (s.login_at, s.id)).max().unwrap();
    assert_eq!((open[0].login_at, open[0].id), newest);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_events_in_clickhouse() {
    let ctx = ExternalContext::new(at(9, 0, 0)).await;
    truncate_events(&ctx.clickhouse).await.ok();

    let user = Uuid::new_v4();
    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();
    let resource = (Uuid::new_v4(), "Atlas");

    ctx.tracker
        .record_event(fixtures::resource_event(
            EventType::ResourceLaunch,
            user,
            session.id,
            resource,
            at(9, 1, 0),
        ))
        .await
        .unwrap();
    ctx.tracker
        .record_event(
            fixtures::resource_event(EventType::ResourceReturn, user, session.id, resource, at(9, 11, 0))
                .with_details(serde_json::json!({ "time_away_secs": 600 })),
        )
        .await
        .unwrap();
    ctx.tracker
        .record_event(fixtures::page_view(user, None, "/member", at(9, 12, 0)))
        .await
        .unwrap();

    assert_eq!(count_all_events(&ctx.clickhouse).await.unwrap(), 3);

    let by_session = ctx.tracker.session_events(session.id).await.unwrap();
    assert_eq!(by_session.len(), 2);
    assert_eq!(by_session[0].event_type, EventType::ResourceLaunch);

    let recent = ctx.tracker.recent_events(user, 2).await.unwrap();
    assert_eq!(recent[0].page_path.as_deref(), Some("/member"));

    ctx.clock.set(at(9, 15, 0));
    let latest = ctx.tracker.latest_resource_events(&[user]).await.unwrap();
    assert_eq!(latest[&user].resource_name.as_deref(), Some("Atlas"));

    let stats = ctx.tracker.weekly_stats(&Scope::users(vec![user])).await.unwrap();
    assert_eq!(stats[&user].resource_minutes, 10);

    let timeline = ctx.tracker.member_timeline(user, chrono_tz::UTC).await.unwrap();
    assert_eq!(timeline.resource_launches, 1);
    assert_eq!(timeline.sessions[0].entries.len(), 5);
}
