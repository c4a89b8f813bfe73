//! Orderly shutdown: refuse new intakes, drain in-flight work, destroy all
//! sessions.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{call, create_session, harness};

#[tokio::test]
async fn drain_lets_in_flight_finish_and_empties_everything() {
    let h = harness(|c| {
        c.max_concurrent_sessions = 4;
        c.pool.max_size = 4;
        c.pool.min_size = 1;
    })
    .await;

    let s1 = create_session(&h.server).await;
    let _s2 = create_session(&h.server).await;

    // A slow tool call in flight on S1.
    h.behavior.set_latency(Duration::from_millis(400));
    let long_call = {
        let server = Arc::clone(&h.server);
        let s1 = s1.clone();
        tokio::spawn(async move {
            server
                .handle(
                    call("navigate")
                        .with_arg("url", json!("https://slow.test/"))
                        .with_session(&s1),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let shutdown = {
        let server = Arc::clone(&h.server);
        tokio::spawn(async move {
            server
                .shutdown_with_deadline(Duration::from_secs(5))
                .await;
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // New intake is refused immediately.
    let refused = h.server.handle(call("list_sessions")).await;
    assert_eq!(
        refused.error.expect("error").code,
        browser_control::ErrorCode::PoolClosed
    );

    // The in-flight call still completes normally.
    let finished = long_call.await.unwrap();
    assert!(finished.is_success(), "{:?}", finished.error);

    shutdown.await.unwrap();

    assert_eq!(h.server.sessions().len(), 0);
    assert_eq!(h.server.pool().counts().total, 0);
    assert!(!h.server.lifecycle().accepting());
}

#[tokio::test]
async fn shutdown_is_safe_with_nothing_in_flight() {
    let h = harness(|_| {}).await;
    create_session(&h.server).await;

    h.server
        .shutdown_with_deadline(Duration::from_millis(500))
        .await;
    assert_eq!(h.server.pool().counts().total, 0);

    // Everything after the drain fails fast.
    let late = h.server.handle(call("create_session")).await;
    assert_eq!(
        late.error.expect("error").code,
        browser_control::ErrorCode::PoolClosed
    );
}
