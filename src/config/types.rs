//! Server configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::driver::BrowserKind;
use crate::error::ControlError;
use crate::session::PoolConfig;

pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 10;
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_WEBDRIVER_ENDPOINT: &str = "http://localhost:4444";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(ControlError::validation(
                "LOG_LEVEL",
                Some(other.to_string()),
                "must be one of: error, warn, info, debug",
            )),
        }
    }
}

/// Everything the server binary needs, assembled from defaults, then the
/// optional config file, then the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub browser_type: BrowserKind,
    pub headless: bool,
    pub max_concurrent_sessions: usize,
    /// Idle timeout applied to pooled sessions.
    pub session_timeout: Duration,
    pub log_level: LogLevel,
    pub port: u16,
    pub webdriver_endpoint: String,
    pub auth: AuthConfig,
    /// Overrides for the pool beyond what the env surface exposes.
    pub pool: PoolConfig,
    /// PID file for daemon mode, when set.
    pub pid_file: Option<PathBuf>,
    /// Base directory for the artifact root; defaults to the process
    /// working directory.
    pub artifact_base: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserKind::Chromium,
            headless: true,
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            log_level: LogLevel::Info,
            port: DEFAULT_PORT,
            webdriver_endpoint: DEFAULT_WEBDRIVER_ENDPOINT.to_string(),
            auth: AuthConfig::default(),
            pool: PoolConfig::default(),
            pid_file: None,
            artifact_base: None,
        }
    }
}

impl ServerConfig {
    /// The pool configuration with the env-driven knobs folded in.
    #[must_use]
    pub fn effective_pool_config(&self) -> PoolConfig {
        let mut pool = self.pool.clone();
        pool.default_kind = self.browser_type;
        pool.default_options.headless = self.headless;
        pool.idle_timeout = self.session_timeout;
        pool
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        if self.port < 1025 {
            return Err(ControlError::validation(
                "PORT",
                Some(self.port.to_string()),
                "must be within 1025..=65535",
            ));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(ControlError::validation(
                "MAX_CONCURRENT_SESSIONS",
                Some("0".to_string()),
                "must be a positive integer",
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(ControlError::validation(
                "SESSION_TIMEOUT",
                Some("0".to_string()),
                "must be a positive number of milliseconds",
            ));
        }
        if url::Url::parse(&self.webdriver_endpoint).is_err() {
            return Err(ControlError::validation(
                "WEBDRIVER_ENDPOINT",
                Some(self.webdriver_endpoint.clone()),
                "must be a valid URL",
            ));
        }
        Ok(())
    }
}
