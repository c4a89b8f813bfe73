//! Pool-facing behavior observed through the public surface: exhaustion,
//! retirement, limits, and recovery.

use serde_json::json;
use std::time::{Duration, Instant};

mod common;
use common::{call, create_session, harness};

#[tokio::test]
async fn pool_exhaustion_fails_the_second_caller_at_the_deadline() {
    let h = harness(|c| {
        c.pool.max_size = 1;
        c.pool.min_size = 1;
        c.pool.borrow_deadline = Duration::from_millis(500);
        c.max_concurrent_sessions = 4;
    })
    .await;

    // The single pooled record is held by the first session for its whole
    // lifetime, so the second create must wait out the borrow deadline.
    let _first = create_session(&h.server).await;

    let started = Instant::now();
    let response = h.server.handle(call("create_session")).await;
    let waited = started.elapsed();

    let error = response.error.expect("error body");
    assert_eq!(error.code, browser_control::ErrorCode::PoolExhausted);
    assert!(
        waited >= Duration::from_millis(400) && waited <= Duration::from_millis(1100),
        "expected ~500ms wait, got {waited:?}"
    );
}

#[tokio::test]
async fn first_caller_is_unaffected_by_anothers_exhaustion() {
    let h = harness(|c| {
        c.pool.max_size = 1;
        c.pool.borrow_deadline = Duration::from_millis(200);
    })
    .await;

    let first = create_session(&h.server).await;
    let _ = h.server.handle(call("create_session")).await; // exhausts

    let nav = h
        .server
        .handle(
            call("navigate")
                .with_arg("url", json!("https://example.test/"))
                .with_session(&first),
        )
        .await;
    assert!(nav.is_success(), "held session must keep working");
}

#[tokio::test]
async fn six_consecutive_failures_retire_the_session_and_replace_it() {
    let h = harness(|c| {
        c.pool.min_size = 1;
        c.pool.max_size = 2;
    })
    .await;

    let session_id = create_session(&h.server).await;
    h.behavior.fail_next_calls(6);

    for i in 0..6 {
        let response = h
            .server
            .handle(
                call("click")
                    .with_arg("selector", json!("#flaky"))
                    .with_session(&session_id),
            )
            .await;
        assert!(
            !response.is_success(),
            "injected failure {i} should surface"
        );
    }

    // The sixth failure crossed the threshold: the binding is gone.
    let listed = h.server.handle(call("list_sessions")).await;
    let ids: Vec<String> = listed.data.unwrap()["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    assert!(!ids.contains(&session_id), "retired session is still listed");

    assert!(h.factory.closed_count() >= 1, "record must be destroyed");

    // Replacement keeps the pool at its minimum.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.server.pool().counts().total >= 1);
    assert_eq!(h.server.sessions().metrics().failed_sessions, 1);
}

#[tokio::test]
async fn session_limit_is_the_user_facing_cap() {
    let h = harness(|c| {
        c.max_concurrent_sessions = 2;
        c.pool.max_size = 4;
    })
    .await;

    create_session(&h.server).await;
    create_session(&h.server).await;

    let response = h.server.handle(call("create_session")).await;
    let error = response.error.expect("error body");
    assert_eq!(error.code, browser_control::ErrorCode::SessionLimit);
}

#[tokio::test]
async fn close_session_is_idempotent_and_restores_capacity() {
    let h = harness(|c| c.max_concurrent_sessions = 1).await;

    let id = create_session(&h.server).await;
    let pool_before = h.server.pool().counts().total;

    let first = h
        .server
        .handle(call("close_session").with_arg("session_id", json!(id.clone())))
        .await;
    assert_eq!(first.data.unwrap()["closed"], json!(true));

    let second = h
        .server
        .handle(call("close_session").with_arg("session_id", json!(id)))
        .await;
    assert_eq!(second.data.unwrap()["closed"], json!(false));

    // Capacity restored: another session can be created, and the pool kept
    // its record for reuse.
    assert!(h.server.pool().counts().total >= 1);
    assert!(h.server.pool().counts().total <= pool_before);
    create_session(&h.server).await;
}

#[tokio::test]
async fn transport_loss_retires_the_binding_immediately() {
    let h = harness(|_| {}).await;
    let session_id = create_session(&h.server).await;

    h.behavior.set_dead(true);
    let response = h
        .server
        .handle(
            call("navigate")
                .with_arg("url", json!("https://example.test/"))
                .with_session(&session_id),
        )
        .await;
    assert_eq!(
        response.error.expect("error").code,
        browser_control::ErrorCode::TransportLost
    );
    h.behavior.set_dead(false);

    assert_eq!(h.server.sessions().len(), 0, "binding must be retired");
}
