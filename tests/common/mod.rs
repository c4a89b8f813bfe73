//! Shared harness for the integration suites: a full server wired to the
//! in-memory stub driver, rooted in a temp directory.

use std::sync::Arc;
use std::time::Duration;

use browser_control::config::ConfigLoad;
use browser_control::driver::stub::{StubBehavior, StubDriverFactory};
use browser_control::{Server, ServerConfig, ToolCallRequest};

pub struct Harness {
    pub server: Arc<Server>,
    pub factory: Arc<StubDriverFactory>,
    pub behavior: StubBehavior,
    // Held for its Drop; the artifact root lives inside.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
}

/// Defaults suitable for fast tests; callers adjust via the mutator.
pub async fn harness(mutate: impl FnOnce(&mut ServerConfig)) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = ServerConfig::default();
    config.artifact_base = Some(dir.path().to_path_buf());
    config.max_concurrent_sessions = 4;
    config.pool.min_size = 1;
    config.pool.max_size = 2;
    config.pool.prewarm_count = 1;
    config.pool.borrow_deadline = Duration::from_millis(500);
    config.pool.health_check_interval = Duration::from_secs(60);
    mutate(&mut config);

    let factory = Arc::new(StubDriverFactory::new());
    let behavior = factory.behavior();
    let server = Server::start_with_factory(
        ConfigLoad {
            config,
            issues: Vec::new(),
        },
        factory.clone(),
        None,
    )
    .await
    .expect("server start");

    Harness {
        server,
        factory,
        behavior,
        dir,
    }
}

pub fn call(tool: &str) -> ToolCallRequest {
    ToolCallRequest::new(tool)
}

/// Create a session through the public tool surface and return its id.
pub async fn create_session(server: &Server) -> String {
    let response = server
        .handle(call("create_session").with_arg("headless", serde_json::json!(true)))
        .await;
    assert!(
        response.is_success(),
        "create_session failed: {:?}",
        response.error
    );
    response
        .data
        .unwrap()
        .get("session_id")
        .and_then(|v| v.as_str())
        .expect("session id in response")
        .to_string()
}
