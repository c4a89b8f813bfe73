//! Browser-control core: a bounded pool of WebDriver-driven browsers behind
//! an authenticated, validated tool dispatcher.
//!
//! The transport framing (MCP/HTTP) lives outside this crate; callers hand
//! a [`ToolCallRequest`] to [`Server::handle`] and get a [`ToolResponse`]
//! back. Everything in between is owned here: the auth gate, the session
//! registry and pool, the per-tool schemas, the health views, and the
//! drain-on-shutdown path.

pub mod auth;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod health;
pub mod session;
pub mod shutdown;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use auth::{AuthConfig, AuthContext, AuthGate, Permission, RequestAuth, Role};
pub use capture::{ArtifactStore, HarCapture};
pub use config::{ConfigLoad, LogLevel, ServerConfig};
pub use dispatch::{Dispatcher, ToolCallRequest, ToolResponse};
pub use driver::{BrowserKind, DriverFactory, DriverHandle, DriverOptions, WebDriverFactory};
pub use error::{ControlError, ErrorCode};
pub use health::{HealthReport, HealthService, HealthStatus};
pub use session::{PoolConfig, SessionPool, SessionRegistry};
pub use shutdown::{Lifecycle, ShutdownCoordinator};

/// Cap on simultaneously executing invocations.
const WORKER_CAP: usize = 64;

/// Cadence of the cached readiness refresh.
const HEALTH_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// The server root: the only process-wide state, owning the registry/pool
/// pair and the components around them.
pub struct Server {
    config: ServerConfig,
    pool: Arc<SessionPool>,
    sessions: Arc<SessionRegistry>,
    auth: Arc<AuthGate>,
    dispatcher: Dispatcher,
    health: Arc<HealthService>,
    lifecycle: Arc<Lifecycle>,
}

impl Server {
    /// Assemble and start against a real WebDriver endpoint.
    pub async fn start(load: ConfigLoad) -> Result<Arc<Self>, ControlError> {
        let endpoint = load.config.webdriver_endpoint.clone();
        let factory = Arc::new(WebDriverFactory::new(&endpoint));
        Self::start_with_factory(load, factory, Some(endpoint)).await
    }

    /// Assemble and start with an injected driver factory. Tests and
    /// offline runs pass the stub factory here.
    pub async fn start_with_factory(
        load: ConfigLoad,
        factory: Arc<dyn DriverFactory>,
        driver_endpoint: Option<String>,
    ) -> Result<Arc<Self>, ControlError> {
        let ConfigLoad { config, issues } = load;
        config.validate()?;

        let pool = SessionPool::new(config.effective_pool_config(), factory);
        pool.start().await;

        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&pool),
            config.max_concurrent_sessions,
        ));
        let auth = Arc::new(AuthGate::new(config.auth.clone()));
        let artifacts = Arc::new(match &config.artifact_base {
            Some(base) => ArtifactStore::at(base.clone()),
            None => ArtifactStore::in_cwd()?,
        });
        let lifecycle = Lifecycle::new(WORKER_CAP);

        let registry = tools::register_all(&tools::ToolDeps {
            sessions: Arc::clone(&sessions),
            artifacts: Arc::clone(&artifacts),
        });
        let dispatcher = Dispatcher::new(
            registry,
            Arc::clone(&auth),
            Arc::clone(&sessions),
            Arc::clone(&lifecycle),
        );

        let health = HealthService::new(
            Arc::clone(&pool),
            Arc::clone(&sessions),
            artifacts,
            driver_endpoint,
            issues,
        );
        health.start_refresh(HEALTH_REFRESH_INTERVAL);

        info!(
            tools = dispatcher.tool_names().len(),
            sessions_cap = config.max_concurrent_sessions,
            pool = ?pool.counts(),
            "browser-control server started"
        );

        Ok(Arc::new(Self {
            config,
            pool,
            sessions,
            auth,
            dispatcher,
            health,
            lifecycle,
        }))
    }

    /// Run one tool call through the full pipeline.
    pub async fn handle(&self, request: ToolCallRequest) -> ToolResponse {
        self.dispatcher.dispatch(request).await
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthGate> {
        &self.auth
    }

    #[must_use]
    pub fn health(&self) -> &Arc<HealthService> {
        &self.health
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.dispatcher.tool_names()
    }

    /// Orderly drain and teardown.
    pub async fn shutdown(&self) {
        self.shutdown_with_deadline(shutdown::DEFAULT_DRAIN_DEADLINE)
            .await;
    }

    /// Shutdown with a custom drain window.
    pub async fn shutdown_with_deadline(&self, drain_deadline: Duration) {
        ShutdownCoordinator::new(
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.sessions),
            Arc::clone(&self.pool),
            Arc::clone(&self.health),
        )
        .with_drain_deadline(drain_deadline)
        .shutdown()
        .await;
    }
}
