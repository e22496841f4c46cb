//! Uncoordinated writers racing on the same sessions.

use std::sync::Arc;

use chrono::Duration;
use integration_tests::fixtures::{self, at};
use integration_tests::setup::TestContext;
use presence_core::EndReason;
use uuid::Uuid;

/// Each heartbeat either lands before the reaper (session stays open with a
/// fresh last-active) or after it (session closed at its old last-active and
/// a new one opened). Nothing in between.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_heartbeats_race_reaper() {
    let ctx = Arc::new(TestContext::new(at(9, 0, 0)));
    let mut sessions = Vec::new();
    for _ in 0..50 {
        let user = Uuid::new_v4();
        let s = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();
        sessions.push(s);
    }

    ctx.set_time(at(9, 15, 0));

    let mut handles = Vec::new();
    for s in sessions.clone() {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.tracker
                .heartbeat(fixtures::heartbeat(s.user_id, Some(s.id), Some("/member")))
                .await
                .unwrap()
        }));
    }
    let reaper = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap() })
    };

    let mut results = Vec::new();
    for h in handles {
        results.push(h.await.unwrap());
    }
    let reaped = reaper.await.unwrap();

    let mut reopened = 0;
    for (s, result) in sessions.iter().zip(&results) {
        let original = ctx.tracker.session(s.id).await.unwrap().unwrap();
        if result.reopened {
            reopened += 1;
            assert_eq!(original.end_reason, Some(EndReason::Inactive));
            assert_eq!(original.logout_at, Some(s.login_at));
            assert_ne!(result.session_id, s.id);
        } else {
            assert!(original.is_open());
            assert_eq!(original.last_active_at, at(9, 15, 0));
        }
        assert_eq!(ctx.store.open_sessions_for(s.user_id), 1);
    }
    assert_eq!(reopened, reaped as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_leave_one_open_session() {
    let ctx = Arc::new(TestContext::new(at(9, 0, 0)));
    let user = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.tracker.login(fixtures::login(user, None)).await.unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(ctx.store.session_count(), 20);
    assert_eq!(ctx.store.open_sessions_for(user), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logout_races_reaper() {
    let ctx = Arc::new(TestContext::new(at(9, 0, 0)));
    let user = Uuid::new_v4();
    let session = ctx.tracker.login(fixtures::login(user, None)).await.unwrap();
    ctx.set_time(at(9, 30, 0));

    let logout = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.tracker.logout(session.id).await.unwrap() })
    };
    let reap = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.tracker.reap_inactive(Duration::minutes(10)).await.unwrap() })
    };

    let logged_out = logout.await.unwrap();
    let reaped = reap.await.unwrap();
    // Exactly one writer closes it.
    assert_ne!(logged_out, reaped == 1);

    let closed = ctx.tracker.session(session.id).await.unwrap().unwrap();
    let expected = if logged_out {
        EndReason::Logout
    } else {
        EndReason::Inactive
    };
    assert_eq!(closed.end_reason, Some(expected));
}
