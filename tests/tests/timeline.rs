//! Member timelines rebuilt from independently stored sessions and events.

use chrono::Duration;
use integration_tests::fixtures::{self, at};
use integration_tests::setup::TestContext;
use presence_core::EventType;
use uuid::Uuid;

/// An event carrying an unknown session id lands in the open session whose
/// window contains it.
#[tokio::test]
async fn test_mismatched_session_id_is_range_matched() {
    let ctx = TestContext::new(at(8, 0, 0));
    let user = Uuid::new_v4();
    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();

    let stale = Uuid::new_v4();
    ctx.tracker
        .record_event(fixtures::page_view(user, Some(stale), "/member/materials", at(8, 30, 0)))
        .await
        .unwrap();

    ctx.set_time(at(9, 0, 0));
    let timeline = ctx.tracker.member_timeline(user, chrono_tz::UTC).await.unwrap();
    assert_eq!(timeline.sessions.len(), 1);

    let block = &timeline.sessions[0];
    assert_eq!(block.session_id, session.id);
    assert!(block.is_open);
    let descriptions: Vec<&str> = block.entries.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(
        descriptions,
        ["Last activity", "Viewed /member/materials", "Logged in"]
    );
}

#[tokio::test]
async fn test_events_before_login_are_dropped() {
    let ctx = TestContext::new(at(10, 0, 0));
    let user = Uuid::new_v4();
    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();

    // Directly linked, but stamped before the session began.
    ctx.tracker
        .record_event(fixtures::page_view(user, Some(session.id), "/member", at(9, 59, 0)))
        .await
        .unwrap();
    ctx.tracker
        .record_event(fixtures::page_view(user, Some(session.id), "/member/calendar", at(10, 1, 0)))
        .await
        .unwrap();

    ctx.set_time(at(10, 5, 0));
    let timeline = ctx.tracker.member_timeline(user, chrono_tz::UTC).await.unwrap();
    let kinds: Vec<&str> = timeline.sessions[0]
        .entries
        .iter()
        .map(|e| e.kind.as_str())
        .collect();
    assert_eq!(kinds, ["last_activity", "page_view", "login"]);
}

/// Closed sessions: logout first, login last, events newest-first between.
#[tokio::test]
async fn test_closed_session_ordering_and_labels() {
    let ctx = TestContext::new(at(14, 0, 0));
    let user = Uuid::new_v4();
    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();
    let resource = (Uuid::new_v4(), "Atlas");

    ctx.tracker
        .record_event(fixtures::resource_event(
            EventType::ResourceLaunch,
            user,
            session.id,
            resource,
            at(14, 5, 0),
        ))
        .await
        .unwrap();
    ctx.tracker
        .record_event(
            fixtures::resource_event(
                EventType::ResourceReturn,
                user,
                session.id,
                resource,
                at(14, 20, 0),
            )
            .with_details(serde_json::json!({ "time_away_secs": 900 })),
        )
        .await
        .unwrap();

    ctx.set_time(at(14, 45, 0));
    ctx.tracker.logout(session.id).await.unwrap();

    let timeline = ctx
        .tracker
        .member_timeline(user, chrono_tz::America::New_York)
        .await
        .unwrap();
    assert_eq!(timeline.resource_launches, 1);
    assert_eq!(timeline.total_time, "45 min");

    let block = &timeline.sessions[0];
    assert!(!block.is_open);
    assert_eq!(block.date_label, "Mar 4, 2024");
    assert_eq!(block.login_label, "9:00 AM");
    assert_eq!(block.logout_label, "9:45 AM");
    assert_eq!(block.end_reason_label, "logout");
    assert_eq!(block.duration_label, "45 min");

    let descriptions: Vec<&str> = block.entries.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(
        descriptions,
        [
            "Logged out",
            "Returned from \"Atlas\"",
            "Launched \"Atlas\"",
            "Logged in"
        ]
    );
}

/// A reaped session followed by a heartbeat-created one.
#[tokio::test]
async fn test_resumed_session_after_timeout() {
    let ctx = TestContext::new(at(9, 0, 0));
    let user = Uuid::new_v4();
    let first = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();

    ctx.advance(Duration::minutes(3));
    ctx.tracker
        .heartbeat(fixtures::heartbeat(user, Some(first.id), Some("/member")))
        .await
        .unwrap();

    ctx.set_time(at(9, 30, 0));
    ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap();

    ctx.advance(Duration::minutes(1));
    let resumed = ctx
        .tracker
        .heartbeat(fixtures::heartbeat(user, Some(first.id), Some("/member")))
        .await
        .unwrap();
    assert!(resumed.reopened);

    // Unlinked and outside both windows: falls back to the open session.
    ctx.tracker
        .record_event(fixtures::page_view(user, None, "/member/help", at(9, 20, 0)))
        .await
        .unwrap();

    ctx.advance(Duration::minutes(1));
    let timeline = ctx.tracker.member_timeline(user, chrono_tz::UTC).await.unwrap();
    assert_eq!(timeline.total_sessions, 2);

    let open = &timeline.sessions[0];
    assert_eq!(open.session_id, resumed.session_id);
    assert_eq!(open.entries.last().unwrap().description, "Session resumed");
    // Stamped before the resumed login, so it is dropped after attribution.
    assert!(open.entries.iter().all(|e| e.kind != "page_view"));

    let reaped = &timeline.sessions[1];
    assert_eq!(reaped.end_reason_label, "inactive");
    assert_eq!(reaped.entries[0].description, "Session timed out");
    assert_eq!(reaped.logout_label, "9:03 AM");
    assert_eq!(reaped.duration_label, "3 min");
}

#[tokio::test]
async fn test_timeline_for_unknown_user_is_empty() {
    let ctx = TestContext::new(at(9, 0, 0));
    let timeline = ctx
        .tracker
        .member_timeline(Uuid::new_v4(), chrono_tz::UTC)
        .await
        .unwrap();
    assert_eq!(timeline.total_sessions, 0);
    assert_eq!(timeline.avg_session_minutes, 0);
    assert_eq!(timeline.total_time, "0 sec");
    assert!(timeline.sessions.is_empty());
}
