//! Driver factory and the uniform automation capability surface.
//!
//! A [`DriverHandle`] is an opaque reference to one live remote-controlled
//! browser. Handles are produced by a [`DriverFactory`] and owned by exactly
//! one session record; nothing else in the crate touches the underlying
//! transport. Tool handlers interact with the browser only through the
//! [`DriverConnection`] capability set, which keeps every tool a thin
//! adapter over the same few primitives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::ControlError;

pub mod stub;
pub mod webdriver;

pub use webdriver::WebDriverFactory;

/// Deadline for each half of a health probe round trip.
pub(crate) const PROBE_DEADLINE: Duration = Duration::from_secs(2);

/// Supported browser families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserKind {
    #[default]
    #[serde(alias = "chrome", alias = "chromium-like")]
    Chromium,
    #[serde(alias = "firefox-like")]
    Firefox,
}

impl BrowserKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserKind {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" | "chromium-like" => Ok(Self::Chromium),
            "firefox" | "firefox-like" | "gecko" => Ok(Self::Firefox),
            other => Err(DriverError::UnsupportedBrowser(other.to_string())),
        }
    }
}

/// Launch options recognized by the factory. The set is closed; callers
/// validate their input against this shape before it reaches the factory.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DriverOptions {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<WindowSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

fn default_headless() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSize {
    pub w: u32,
    pub h: u32,
}

/// A window rect as the driver reports it. Drivers clamp requested rects to
/// the monitor they actually place the window on, so setters report back
/// the applied rect rather than echoing the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Element selector. Tools accept CSS by default and XPath when prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    /// Parse the tool-facing selector syntax: `xpath=` prefix switches
    /// strategies, everything else is CSS.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix("xpath=") {
            Some(xp) => Self::XPath(xp.to_string()),
            None => Self::Css(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Css(s) | Self::XPath(s) => s,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "{s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
        }
    }
}

/// Cookie shape shared between tools and the driver layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

/// Result of one [`DriverFactory::probe`] round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub healthy: bool,
    pub can_navigate: bool,
    pub can_execute_script: bool,
    pub response_time_ms: u64,
}

/// Errors raised by the driver layer. Classified so the session layer can
/// tell a dead transport from a tool-level miss.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("unsupported browser kind `{0}`")]
    UnsupportedBrowser(String),

    #[error("failed to create {kind} driver: {reason}")]
    CreationFailed { kind: BrowserKind, reason: String },

    #[error("driver transport lost: {0}")]
    TransportLost(String),

    #[error("no element matches `{0}`")]
    ElementNotFound(String),

    #[error("element `{0}` is not interactable")]
    ElementNotInteractable(String),

    #[error("stale reference to element `{0}`")]
    StaleElement(String),

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("no active dialog")]
    NoDialog,

    #[error("driver error: {0}")]
    Other(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    pub(crate) fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

impl From<DriverError> for ControlError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::UnsupportedBrowser(kind) => ControlError::validation(
                "browser_kind",
                Some(kind),
                "must be one of: chromium, firefox",
            ),
            DriverError::CreationFailed { kind, reason } => ControlError::DriverCreateFailed {
                kind: kind.to_string(),
                reason,
            },
            DriverError::TransportLost(reason) => ControlError::TransportLost { reason },
            DriverError::ElementNotFound(selector) => ControlError::ElementNotFound { selector },
            DriverError::ElementNotInteractable(selector) => {
                ControlError::ElementNotInteractable { selector }
            }
            DriverError::StaleElement(selector) => ControlError::StaleElement { selector },
            DriverError::Timeout {
                operation,
                timeout_ms,
            } => ControlError::Timeout {
                operation,
                timeout_ms,
            },
            DriverError::NoDialog => {
                ControlError::validation("dialog", None, "no dialog is currently open")
            }
            DriverError::Other(message) => ControlError::Internal { message },
        }
    }
}

/// The uniform capability set tool handlers are written against.
///
/// One live browser per connection; callers serialize access by holding the
/// owning session record exclusively, so methods take `&self` and the
/// implementation may keep interior transport state.
#[async_trait]
pub trait DriverConnection: Send + Sync {
    // Navigation
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<()>;
    async fn back(&self) -> DriverResult<()>;
    async fn forward(&self) -> DriverResult<()>;
    async fn reload(&self) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;
    async fn title(&self) -> DriverResult<String>;
    async fn page_source(&self) -> DriverResult<String>;

    // Elements
    async fn exists(&self, selector: &Selector) -> DriverResult<bool>;
    async fn click(&self, selector: &Selector) -> DriverResult<()>;
    async fn type_text(&self, selector: &Selector, text: &str, clear_first: bool)
        -> DriverResult<()>;
    async fn select_value(&self, selector: &Selector, value: &str) -> DriverResult<()>;
    async fn hover(&self, selector: &Selector) -> DriverResult<()>;
    async fn element_text(&self, selector: &Selector) -> DriverResult<String>;
    async fn element_attr(&self, selector: &Selector, name: &str)
        -> DriverResult<Option<String>>;
    async fn element_css(&self, selector: &Selector, property: &str) -> DriverResult<String>;
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    // Scripts
    async fn execute(&self, script: &str, args: Vec<Value>, timeout: Duration)
        -> DriverResult<Value>;

    // Dialogs
    async fn dialog_accept(&self) -> DriverResult<()>;
    async fn dialog_dismiss(&self) -> DriverResult<()>;
    async fn dialog_text(&self) -> DriverResult<String>;
    async fn dialog_send_text(&self, text: &str) -> DriverResult<()>;

    // Windows
    async fn windows(&self) -> DriverResult<Vec<String>>;
    async fn active_window(&self) -> DriverResult<String>;
    async fn switch_window(&self, handle: &str) -> DriverResult<()>;
    async fn open_window(&self, as_tab: bool) -> DriverResult<String>;
    async fn close_window(&self) -> DriverResult<()>;
    async fn window_rect(&self) -> DriverResult<WindowRect>;
    async fn set_window_rect(&self, rect: WindowRect) -> DriverResult<WindowRect>;

    // Frames
    async fn switch_frame(&self, selector: &Selector) -> DriverResult<()>;
    async fn parent_frame(&self) -> DriverResult<()>;

    // Storage
    async fn cookies(&self) -> DriverResult<Vec<CookieSpec>>;
    async fn add_cookie(&self, cookie: CookieSpec) -> DriverResult<()>;
    async fn delete_cookie(&self, name: &str) -> DriverResult<()>;
    async fn clear_cookies(&self) -> DriverResult<()>;

    // Lifecycle
    /// Cheap transport liveness check; never errors.
    async fn ping(&self) -> bool;
    /// Idempotent teardown; errors are logged by the implementation.
    async fn shutdown(&self);
}

/// Opaque reference to one live remote-controlled browser.
pub struct DriverHandle {
    kind: BrowserKind,
    serial: u64,
    endpoint: String,
    conn: Box<dyn DriverConnection>,
}

impl DriverHandle {
    pub fn new(
        kind: BrowserKind,
        serial: u64,
        endpoint: impl Into<String>,
        conn: Box<dyn DriverConnection>,
    ) -> Self {
        Self {
            kind,
            serial,
            endpoint: endpoint.into(),
            conn,
        }
    }

    #[must_use]
    pub fn kind(&self) -> BrowserKind {
        self.kind
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn conn(&self) -> &dyn DriverConnection {
        self.conn.as_ref()
    }
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("kind", &self.kind)
            .field("serial", &self.serial)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Turns a (kind, options) pair into a usable [`DriverHandle`].
///
/// `close`, `validate`, and `probe` have uniform default implementations in
/// terms of the connection; factories normally override only `create`.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(
        &self,
        kind: BrowserKind,
        options: &DriverOptions,
    ) -> Result<DriverHandle, DriverError>;

    /// Idempotent; teardown failures are logged and swallowed so close can
    /// never fail the caller.
    async fn close(&self, handle: &DriverHandle) {
        handle.conn().shutdown().await;
    }

    /// Cheap "is the transport still alive" check.
    async fn validate(&self, handle: &DriverHandle) -> bool {
        handle.conn().ping().await
    }

    /// One navigation-adjacent and one script round trip, each bounded by a
    /// short internal deadline.
    async fn probe(&self, handle: &DriverHandle) -> ProbeReport {
        let started = Instant::now();

        let can_navigate = matches!(
            tokio::time::timeout(PROBE_DEADLINE, handle.conn().current_url()).await,
            Ok(Ok(_))
        );

        let can_execute_script = matches!(
            tokio::time::timeout(
                PROBE_DEADLINE,
                handle.conn().execute("return 1 + 1;", Vec::new(), PROBE_DEADLINE),
            )
            .await,
            Ok(Ok(_))
        );

        ProbeReport {
            healthy: can_navigate && can_execute_script,
            can_navigate,
            can_execute_script,
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_accepts_aliases_and_rejects_unknown() {
        assert_eq!("chrome".parse::<BrowserKind>().unwrap(), BrowserKind::Chromium);
        assert_eq!(
            "chromium-like".parse::<BrowserKind>().unwrap(),
            BrowserKind::Chromium
        );
        assert_eq!("firefox".parse::<BrowserKind>().unwrap(), BrowserKind::Firefox);
        assert!(matches!(
            "safari".parse::<BrowserKind>(),
            Err(DriverError::UnsupportedBrowser(k)) if k == "safari"
        ));
    }

    #[test]
    fn selector_prefix_switches_strategy() {
        assert_eq!(
            Selector::parse("xpath=//div[@id='x']"),
            Selector::XPath("//div[@id='x']".to_string())
        );
        assert_eq!(Selector::parse("#main a"), Selector::Css("#main a".to_string()));
    }

    #[test]
    fn driver_errors_map_to_stable_codes() {
        use crate::error::ErrorCode;

        let err: ControlError = DriverError::StaleElement("#old".into()).into();
        assert_eq!(err.code(), ErrorCode::StaleElement);

        let err: ControlError = DriverError::CreationFailed {
            kind: BrowserKind::Firefox,
            reason: "geckodriver unreachable".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::DriverCreateFailed);
    }
}
