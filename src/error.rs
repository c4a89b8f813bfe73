//! Error taxonomy with stable machine codes.
//!
//! Every failure that crosses a component boundary is a [`ControlError`].
//! The dispatcher maps errors into the response envelope via [`ErrorBody`],
//! which carries the stable `code`, a human message, and optional
//! `field`/`value`/`troubleshooting` context. Secret material never enters
//! an error message; callers sanitize values before attaching them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable machine codes for the wire surface.
///
/// The serialized form is frozen; renaming a variant here is a breaking
/// protocol change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    AuthFailed,
    PermissionDenied,
    RateLimited,
    Validation,
    UnknownTool,
    SessionNotFound,
    SessionLimit,
    PoolExhausted,
    PoolClosed,
    DriverCreateFailed,
    TransportLost,
    ElementNotFound,
    ElementNotInteractable,
    StaleElement,
    Timeout,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Validation => "VALIDATION",
            Self::UnknownTool => "UNKNOWN_TOOL",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionLimit => "SESSION_LIMIT",
            Self::PoolExhausted => "POOL_EXHAUSTED",
            Self::PoolClosed => "POOL_CLOSED",
            Self::DriverCreateFailed => "DRIVER_CREATE_FAILED",
            Self::TransportLost => "TRANSPORT_LOST",
            Self::ElementNotFound => "ELEMENT_NOT_FOUND",
            Self::ElementNotInteractable => "ELEMENT_NOT_INTERACTABLE",
            Self::StaleElement => "STALE_ELEMENT",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error for every operation the control plane exposes.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("permission denied for {resource}.{action}")]
    PermissionDenied { resource: String, action: String },

    #[error("rate limit exceeded ({scope})")]
    RateLimited { scope: String },

    #[error("invalid parameter `{field}`: {reason}")]
    Validation {
        field: String,
        /// Sanitized offending value, only for loggable fields.
        value: Option<String>,
        reason: String,
    },

    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },

    #[error("session `{id}` not found")]
    SessionNotFound { id: String },

    #[error("concurrent session limit of {limit} reached")]
    SessionLimit { limit: usize },

    #[error("no pooled session became available within {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("session pool is shut down")]
    PoolClosed,

    #[error("failed to launch {kind} browser: {reason}")]
    DriverCreateFailed { kind: String, reason: String },

    #[error("browser transport lost: {reason}")]
    TransportLost { reason: String },

    #[error("no element matches `{selector}`")]
    ElementNotFound { selector: String },

    #[error("element `{selector}` is not interactable")]
    ElementNotInteractable { selector: String },

    #[error("stale reference to element `{selector}`")]
    StaleElement { selector: String },

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{message}")]
    Internal { message: String },
}

impl ControlError {
    /// Convenience constructor for validation failures.
    pub fn validation(
        field: impl Into<String>,
        value: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            value,
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthRequired => ErrorCode::AuthRequired,
            Self::AuthFailed { .. } => ErrorCode::AuthFailed,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::UnknownTool { .. } => ErrorCode::UnknownTool,
            Self::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Self::SessionLimit { .. } => ErrorCode::SessionLimit,
            Self::PoolExhausted { .. } => ErrorCode::PoolExhausted,
            Self::PoolClosed => ErrorCode::PoolClosed,
            Self::DriverCreateFailed { .. } => ErrorCode::DriverCreateFailed,
            Self::TransportLost { .. } => ErrorCode::TransportLost,
            Self::ElementNotFound { .. } => ErrorCode::ElementNotFound,
            Self::ElementNotInteractable { .. } => ErrorCode::ElementNotInteractable,
            Self::StaleElement { .. } => ErrorCode::StaleElement,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Short actionable hint attached to the response envelope.
    #[must_use]
    pub fn troubleshooting(&self) -> Option<&'static str> {
        match self {
            Self::AuthRequired => {
                Some("Supply an API key or bearer token in the auth headers.")
            }
            Self::AuthFailed { .. } => {
                Some("Verify the credential is current and sent under the expected header.")
            }
            Self::PermissionDenied { .. } => {
                Some("Ask an operator to grant a role covering this resource and action.")
            }
            Self::RateLimited { .. } => Some("Back off and retry after the limit window."),
            Self::UnknownTool { .. } => {
                Some("Call list_sessions or consult the tool catalog for valid names.")
            }
            Self::SessionNotFound { .. } => {
                Some("The session may have been closed or retired; create a new one.")
            }
            Self::SessionLimit { .. } => {
                Some("Close an existing session or raise MAX_CONCURRENT_SESSIONS.")
            }
            Self::PoolExhausted { .. } => {
                Some("All pooled browsers are busy; retry, or raise the pool max size.")
            }
            Self::PoolClosed => Some("The server is shutting down; no new work is accepted."),
            Self::DriverCreateFailed { .. } => {
                Some("Check that the WebDriver endpoint is reachable and the browser is installed.")
            }
            Self::TransportLost { .. } => {
                Some("The browser process died mid-call; the session will be retired.")
            }
            Self::ElementNotFound { .. } => {
                Some("Verify the selector, or use wait_for_element before interacting.")
            }
            Self::StaleElement { .. } => {
                Some("The page changed under the element; re-query the selector.")
            }
            _ => None,
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    fn value(&self) -> Option<&str> {
        match self {
            Self::Validation { value, .. } => value.as_deref(),
            _ => None,
        }
    }
}

/// Wire shape of an error inside the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troubleshooting: Option<String>,
}

impl From<&ControlError> for ErrorBody {
    fn from(err: &ControlError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            field: err.field().map(str::to_string),
            value: err.value().map(str::to_string),
            troubleshooting: err.troubleshooting().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::PoolExhausted).unwrap();
        assert_eq!(json, "\"POOL_EXHAUSTED\"");
        assert_eq!(ErrorCode::PoolExhausted.as_str(), "POOL_EXHAUSTED");
    }

    #[test]
    fn validation_error_carries_field_and_value() {
        let err = ControlError::validation("url", Some("ftp://x".into()), "scheme not allowed");
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, ErrorCode::Validation);
        assert_eq!(body.field.as_deref(), Some("url"));
        assert_eq!(body.value.as_deref(), Some("ftp://x"));
    }

    #[test]
    fn every_variant_maps_to_its_code() {
        let err = ControlError::TransportLost {
            reason: "socket closed".into(),
        };
        assert_eq!(err.code(), ErrorCode::TransportLost);
        assert_eq!(ControlError::PoolClosed.code(), ErrorCode::PoolClosed);
    }
}
