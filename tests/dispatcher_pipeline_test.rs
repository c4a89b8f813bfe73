//! End-to-end pipeline behavior through the public `Server::handle` surface.

use serde_json::json;

mod common;
use common::{call, create_session, harness};

#[tokio::test]
async fn happy_path_create_navigate_close() {
    let h = harness(|_| {}).await;

    let session_id = create_session(&h.server).await;

    let nav = h
        .server
        .handle(
            call("navigate")
                .with_arg("url", json!("https://example.test/"))
                .with_session(&session_id),
        )
        .await;
    assert!(nav.is_success(), "navigate failed: {:?}", nav.error);
    assert_eq!(
        nav.data.unwrap()["url"].as_str().unwrap(),
        "https://example.test/"
    );

    let close = h
        .server
        .handle(call("close_session").with_arg("session_id", json!(session_id.clone())))
        .await;
    assert!(close.is_success());
    assert_eq!(close.data.unwrap()["closed"], json!(true));

    // Registry empty, pool keeps at least its minimum, no audit denials.
    assert_eq!(h.server.sessions().len(), 0);
    assert!(h.server.pool().counts().total >= 1);
    assert_eq!(h.server.auth().audit_log().denial_count(), 0);
}

#[tokio::test]
async fn unknown_tool_is_a_stable_code() {
    let h = harness(|_| {}).await;
    let response = h.server.handle(call("warp_drive")).await;
    let error = response.error.expect("error body");
    assert_eq!(error.code, browser_control::ErrorCode::UnknownTool);
    assert!(error.troubleshooting.is_some());
}

#[tokio::test]
async fn bad_url_scheme_fails_validation_before_any_session_is_bound() {
    let h = harness(|_| {}).await;
    let session_id = create_session(&h.server).await;
    let actions_before = h.server.sessions().list()[0].total_actions;

    let response = h
        .server
        .handle(
            call("navigate")
                .with_arg("url", json!("file:///etc/passwd"))
                .with_session(&session_id),
        )
        .await;

    let error = response.error.expect("error body");
    assert_eq!(error.code, browser_control::ErrorCode::Validation);
    assert_eq!(error.field.as_deref(), Some("url"));
    assert_eq!(error.value.as_deref(), Some("file:///etc/passwd"));

    // Validation failed before binding: nothing was recorded against the
    // session.
    let actions_after = h.server.sessions().list()[0].total_actions;
    assert_eq!(actions_before, actions_after);
}

#[tokio::test]
async fn unknown_parameters_are_rejected_as_a_closed_set() {
    let h = harness(|_| {}).await;
    let session_id = create_session(&h.server).await;

    let response = h
        .server
        .handle(
            call("navigate")
                .with_arg("url", json!("https://example.test/"))
                .with_arg("turbo", json!(true))
                .with_session(&session_id),
        )
        .await;
    let error = response.error.expect("error body");
    assert_eq!(error.code, browser_control::ErrorCode::Validation);
    assert!(error.message.contains("turbo"));
}

#[tokio::test]
async fn missing_session_and_default_session_resolution() {
    let h = harness(|_| {}).await;

    // No sessions at all: navigate has no default to fall back to.
    let response = h
        .server
        .handle(call("navigate").with_arg("url", json!("https://example.test/")))
        .await;
    assert_eq!(
        response.error.expect("error").code,
        browser_control::ErrorCode::SessionNotFound
    );

    // With a session present, the first listed is the implicit target.
    let _session_id = create_session(&h.server).await;
    let response = h.server.handle(call("get_current_url")).await;
    assert!(response.is_success());

    // An explicit unknown id stays fatal even with a default available.
    let response = h
        .server
        .handle(call("get_current_url").with_session("not-a-session"))
        .await;
    assert_eq!(
        response.error.expect("error").code,
        browser_control::ErrorCode::SessionNotFound
    );
}

#[tokio::test]
async fn actions_are_tracked_in_session_history() {
    let h = harness(|_| {}).await;
    let session_id = create_session(&h.server).await;

    for _ in 0..3 {
        let ok = h
            .server
            .handle(
                call("click")
                    .with_arg("selector", json!("#submit"))
                    .with_session(&session_id),
            )
            .await;
        assert!(ok.is_success());
    }

    let info = h
        .server
        .handle(call("get_session_info").with_arg("session_id", json!(session_id)))
        .await;
    let data = info.data.expect("info data");
    assert_eq!(data["performance"]["total_actions"], json!(3));
    assert_eq!(data["performance"]["successful_actions"], json!(3));
    assert_eq!(data["active_element"], json!("#submit"));
    assert_eq!(data["recent_actions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn list_sessions_snapshot_is_insertion_ordered() {
    let h = harness(|c| c.max_concurrent_sessions = 3).await;
    let first = create_session(&h.server).await;
    let second = create_session(&h.server).await;

    let listed = h.server.handle(call("list_sessions")).await;
    let data = listed.data.expect("list data");
    let ids: Vec<&str> = data["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);
    assert_eq!(data["count"], json!(2));
    assert_eq!(data["cap"], json!(3));
}
