//! Liveness, readiness, and startup views over one set of checks.
//!
//! Liveness red means "restart me". Readiness red means "stop routing
//! traffic here" without implying a restart. Startup reports whether the
//! process ever became able to serve. Each view aggregates its checks
//! worst-of: any unhealthy makes the view unhealthy, else any degraded
//! makes it degraded.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::capture::ArtifactStore;
use crate::session::{SessionPool, SessionRegistry};

/// Memory pressure policy: degraded above 80%, unhealthy above 90% of
/// system memory.
const MEMORY_DEGRADED_RATIO: f64 = 0.80;
const MEMORY_UNHEALTHY_RATIO: f64 = 0.90;

/// Reachability probes get a short deadline of their own.
const PROBE_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn worse(self, other: Self) -> Self {
        use HealthStatus::{Degraded, Healthy, Unhealthy};
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            (Healthy, Healthy) => Healthy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl CheckResult {
    fn healthy(name: &str, started: Instant) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: None,
        }
    }

    fn with_status(
        name: &str,
        started: Instant,
        status: HealthStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<CheckResult>,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    fn from_checks(checks: Vec<CheckResult>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worse);
        Self {
            status,
            checks,
            generated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// The three published views.
pub struct HealthService {
    pool: Arc<SessionPool>,
    registry: Arc<SessionRegistry>,
    artifacts: Arc<ArtifactStore>,
    /// WebDriver endpoint probed for readiness; `None` means the factory is
    /// in-process (stub) and always reachable.
    driver_endpoint: Option<String>,
    /// Validation findings carried over from configuration load: missing
    /// environment names, ignored keys, and the like.
    config_issues: Vec<String>,
    cached: Mutex<Option<HealthReport>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl HealthService {
    pub fn new(
        pool: Arc<SessionPool>,
        registry: Arc<SessionRegistry>,
        artifacts: Arc<ArtifactStore>,
        driver_endpoint: Option<String>,
        config_issues: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            registry,
            artifacts,
            driver_endpoint,
            config_issues,
            cached: Mutex::new(None),
            refresher: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    /// Periodically refresh the readiness snapshot so `cached()` stays
    /// warm for cheap polling surfaces.
    pub fn start_refresh(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(service) = weak.upgrade() else { break };
                if service.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let report = service.readiness().await;
                *service.cached.lock() = Some(report);
            }
            debug!("health refresh loop exiting");
        });
        *self.refresher.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.refresher.lock().take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn cached(&self) -> Option<HealthReport> {
        self.cached.lock().clone()
    }

    /// Liveness: a red here means the process should be restarted.
    pub async fn liveness(&self) -> HealthReport {
        let checks = vec![
            self.check_event_loop().await,
            self.check_memory(),
            self.check_disk().await,
        ];
        HealthReport::from_checks(checks)
    }

    /// Readiness: liveness plus capacity and reachability.
    pub async fn readiness(&self) -> HealthReport {
        let mut checks = self.liveness().await.checks;
        checks.push(self.check_pool_capacity());
        checks.push(self.check_driver_reachable().await);
        HealthReport::from_checks(checks)
    }

    /// Startup: configuration validated, dependencies resolvable, and at
    /// least one session creatable.
    pub async fn startup(&self) -> HealthReport {
        let checks = vec![
            self.check_config(),
            self.check_dependencies(),
            self.check_session_creatable(),
        ];
        HealthReport::from_checks(checks)
    }

    async fn check_event_loop(&self) -> CheckResult {
        let started = Instant::now();
        tokio::task::yield_now().await;
        let lag = started.elapsed();
        if lag > Duration::from_millis(500) {
            CheckResult::with_status(
                "event_loop",
                started,
                HealthStatus::Unhealthy,
                format!("scheduler lag {} ms", lag.as_millis()),
            )
        } else if lag > Duration::from_millis(50) {
            CheckResult::with_status(
                "event_loop",
                started,
                HealthStatus::Degraded,
                format!("scheduler lag {} ms", lag.as_millis()),
            )
        } else {
            CheckResult::healthy("event_loop", started)
        }
    }

    fn check_memory(&self) -> CheckResult {
        let started = Instant::now();
        let mut system = sysinfo::System::new();
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        if total == 0 {
            return CheckResult::with_status(
                "memory",
                started,
                HealthStatus::Degraded,
                "memory statistics unavailable",
            );
        }

        let ratio = used as f64 / total as f64;
        let status = if ratio > MEMORY_UNHEALTHY_RATIO {
            HealthStatus::Unhealthy
        } else if ratio > MEMORY_DEGRADED_RATIO {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let mut result = CheckResult::with_status(
            "memory",
            started,
            status,
            format!("system memory {:.0}% used", ratio * 100.0),
        );
        result.metadata = Some(json!({
            "used_bytes": used,
            "total_bytes": total,
        }));
        result
    }

    async fn check_disk(&self) -> CheckResult {
        let started = Instant::now();
        if self.artifacts.writable().await {
            CheckResult::healthy("disk", started)
        } else {
            CheckResult::with_status(
                "disk",
                started,
                HealthStatus::Unhealthy,
                format!("artifact root {:?} is not writable", self.artifacts.root()),
            )
        }
    }

    fn check_pool_capacity(&self) -> CheckResult {
        let started = Instant::now();
        if self.pool.is_closed() {
            return CheckResult::with_status(
                "pool",
                started,
                HealthStatus::Unhealthy,
                "session pool is shut down",
            );
        }
        let counts = self.pool.counts();
        let mut result = if counts.total == 0 {
            CheckResult::with_status(
                "pool",
                started,
                HealthStatus::Degraded,
                "no live sessions in the pool yet",
            )
        } else {
            CheckResult::healthy("pool", started)
        };
        result.metadata = Some(json!({
            "total": counts.total,
            "available": counts.available,
            "in_use": counts.in_use,
            "registry_active": self.registry.len(),
        }));
        result
    }

    async fn check_driver_reachable(&self) -> CheckResult {
        let started = Instant::now();
        let Some(endpoint) = &self.driver_endpoint else {
            return CheckResult::healthy("driver_endpoint", started);
        };

        let target = match Url::parse(endpoint) {
            Ok(url) => {
                let host = url.host_str().unwrap_or("localhost").to_string();
                let port = url.port_or_known_default().unwrap_or(4444);
                format!("{host}:{port}")
            }
            Err(_) => endpoint.clone(),
        };

        match tokio::time::timeout(PROBE_DEADLINE, tokio::net::TcpStream::connect(&target)).await
        {
            Ok(Ok(_)) => CheckResult::healthy("driver_endpoint", started),
            Ok(Err(err)) => CheckResult::with_status(
                "driver_endpoint",
                started,
                HealthStatus::Unhealthy,
                format!("{target} unreachable: {err}"),
            ),
            Err(_) => CheckResult::with_status(
                "driver_endpoint",
                started,
                HealthStatus::Unhealthy,
                format!("{target} did not accept within {} ms", PROBE_DEADLINE.as_millis()),
            ),
        }
    }

    fn check_config(&self) -> CheckResult {
        let started = Instant::now();
        if self.config_issues.is_empty() {
            CheckResult::healthy("config", started)
        } else {
            // Missing optional surface is degraded, never unhealthy: the
            // process runs on defaults.
            CheckResult::with_status(
                "config",
                started,
                HealthStatus::Degraded,
                self.config_issues.join("; "),
            )
        }
    }

    fn check_dependencies(&self) -> CheckResult {
        let started = Instant::now();
        match &self.driver_endpoint {
            Some(endpoint) if Url::parse(endpoint).is_err() => CheckResult::with_status(
                "dependencies",
                started,
                HealthStatus::Unhealthy,
                format!("driver endpoint `{endpoint}` is not a valid URL"),
            ),
            _ => CheckResult::healthy("dependencies", started),
        }
    }

    fn check_session_creatable(&self) -> CheckResult {
        let started = Instant::now();
        let counts = self.pool.counts();
        if counts.total > 0 {
            CheckResult::healthy("session_creatable", started)
        } else if self.pool.is_closed() {
            CheckResult::with_status(
                "session_creatable",
                started,
                HealthStatus::Unhealthy,
                "pool is shut down",
            )
        } else {
            CheckResult::with_status(
                "session_creatable",
                started,
                HealthStatus::Degraded,
                "no session has been created yet",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::stub::StubDriverFactory;
    use crate::session::PoolConfig;

    async fn service(prewarm: usize) -> (tempfile::TempDir, Arc<HealthService>) {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(StubDriverFactory::new());
        let pool = SessionPool::new(
            PoolConfig {
                min_size: prewarm,
                prewarm_count: prewarm,
                ..PoolConfig::default()
            },
            factory,
        );
        pool.start().await;
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&pool), 4));
        let artifacts = Arc::new(ArtifactStore::at(dir.path()));
        let service = HealthService::new(pool, registry, artifacts, None, Vec::new());
        (dir, service)
    }

    #[test]
    fn aggregation_is_worst_of() {
        use HealthStatus::{Degraded, Healthy, Unhealthy};
        assert_eq!(Healthy.worse(Degraded), Degraded);
        assert_eq!(Degraded.worse(Unhealthy), Unhealthy);
        assert_eq!(Healthy.worse(Healthy), Healthy);
    }

    #[tokio::test]
    async fn liveness_is_healthy_on_a_quiet_process() {
        let (_dir, service) = service(1).await;
        let report = service.liveness().await;
        assert_ne!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks.len(), 3);
    }

    #[tokio::test]
    async fn startup_reports_missing_config_as_degraded_with_names() {
        let (_dir, service) = {
            let dir = tempfile::tempdir().unwrap();
            let factory = Arc::new(StubDriverFactory::new());
            let pool = SessionPool::new(
                PoolConfig {
                    min_size: 0,
                    prewarm_count: 0,
                    ..PoolConfig::default()
                },
                factory,
            );
            pool.start().await;
            let registry = Arc::new(SessionRegistry::new(Arc::clone(&pool), 4));
            let artifacts = Arc::new(ArtifactStore::at(dir.path()));
            let service = HealthService::new(
                pool,
                registry,
                artifacts,
                None,
                vec!["MAX_CONCURRENT_SESSIONS is not set".to_string()],
            );
            (dir, service)
        };

        let report = service.startup().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        let config = report.checks.iter().find(|c| c.name == "config").unwrap();
        assert!(config
            .message
            .as_deref()
            .unwrap()
            .contains("MAX_CONCURRENT_SESSIONS"));
    }

    #[tokio::test]
    async fn readiness_flags_a_closed_pool() {
        let (_dir, service) = service(1).await;
        service.pool.shutdown().await;
        let report = service.readiness().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
