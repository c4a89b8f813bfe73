//! Auth gate behavior through the full pipeline: wildcard roles, rate
//! limits, and the disabled-gate default.

use serde_json::json;
use std::collections::HashMap;

use browser_control::auth::{ApiKeyEntry, RateLimitSpec};
use browser_control::{Permission, RequestAuth, Role, ToolCallRequest};

mod common;
use common::{call, create_session, harness};

fn keyed(mut request: ToolCallRequest, key: &str) -> ToolCallRequest {
    request.auth = RequestAuth {
        headers: HashMap::from([("x-api-key".to_string(), key.to_string())]),
        source_address: "127.0.0.1".to_string(),
        secure_transport: true,
    };
    request
}

#[tokio::test]
async fn wildcard_role_grants_prefixed_actions_only() {
    let h = harness(|c| {
        c.auth.enabled = true;
        c.auth.api_keys = vec![ApiKeyEntry {
            key: "sk-tester".to_string(),
            identity: "tester-ci".to_string(),
            roles: vec!["tester".to_string()],
            rate_limit: None,
        }];
    })
    .await;
    h.server
        .auth()
        .register_role(
            Role::new("tester")
                .permit(Permission::new("extraction", "get*"))
                .permit(Permission::new("extraction", "take*"))
                .permit(Permission::new("session", "*")),
        )
        .unwrap();

    let response = h.server.handle(keyed(call("create_session"), "sk-tester")).await;
    assert!(response.is_success(), "{:?}", response.error);
    let session_id = response.data.unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // get* and take* are covered by the trailing wildcards.
    let text = h
        .server
        .handle(keyed(
            call("get_element_text")
                .with_arg("selector", json!("#headline"))
                .with_session(&session_id),
            "sk-tester",
        ))
        .await;
    assert!(text.is_success(), "{:?}", text.error);

    let shot = h
        .server
        .handle(keyed(
            call("take_screenshot").with_session(&session_id),
            "sk-tester",
        ))
        .await;
    assert!(shot.is_success(), "{:?}", shot.error);

    // Anything outside the granted prefixes is denied.
    let nav = h
        .server
        .handle(keyed(
            call("navigate")
                .with_arg("url", json!("https://example.test/"))
                .with_session(&session_id),
            "sk-tester",
        ))
        .await;
    assert_eq!(
        nav.error.expect("error").code,
        browser_control::ErrorCode::PermissionDenied
    );
    assert_eq!(h.server.auth().audit_log().denial_count(), 1);
}

#[tokio::test]
async fn global_rate_limit_rejects_the_fourth_call_in_the_window() {
    let h = harness(|c| {
        c.auth.global_rate_limit = Some(RateLimitSpec {
            points: 3,
            window_seconds: 1,
        });
    })
    .await;

    for i in 0..3 {
        let response = h.server.handle(call("list_sessions")).await;
        assert!(response.is_success(), "call {i} should pass");
    }

    let fourth = h.server.handle(call("list_sessions")).await;
    assert_eq!(
        fourth.error.expect("error").code,
        browser_control::ErrorCode::RateLimited
    );
}

#[tokio::test]
async fn disabled_gate_admits_anonymous_callers_everywhere() {
    let h = harness(|_| {}).await;
    let session_id = create_session(&h.server).await;

    // No credentials anywhere, every resource reachable.
    let response = h
        .server
        .handle(
            call("get_current_url").with_session(&session_id),
        )
        .await;
    assert!(response.is_success());
    assert_eq!(h.server.auth().audit_log().denial_count(), 0);
}

#[tokio::test]
async fn missing_credentials_fail_closed_when_the_gate_is_on() {
    let h = harness(|c| {
        c.auth.enabled = true;
        c.auth.api_keys = vec![ApiKeyEntry {
            key: "sk-real".to_string(),
            identity: "ops".to_string(),
            roles: vec![],
            rate_limit: None,
        }];
    })
    .await;

    let anonymous = h.server.handle(call("list_sessions")).await;
    assert_eq!(
        anonymous.error.expect("error").code,
        browser_control::ErrorCode::AuthRequired
    );

    let wrong = h.server.handle(keyed(call("list_sessions"), "sk-wrong")).await;
    assert_eq!(
        wrong.error.expect("error").code,
        browser_control::ErrorCode::AuthFailed
    );
}
