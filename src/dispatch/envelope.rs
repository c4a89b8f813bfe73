//! Wire shapes of a tool call and its response envelope.
//!
//! The MCP/HTTP framing lives outside this crate; what it hands over and
//! gets back are exactly these serde types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::RequestAuth;
use crate::error::{ControlError, ErrorBody};

/// One tool call as the transport delivers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub auth: RequestAuth,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments: Map::new(),
            session_id: None,
            auth: RequestAuth::default(),
        }
    }

    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The envelope every call resolves to, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ToolResponse {
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(err: &ControlError) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_envelope_serializes_code_and_hint() {
        let err = ControlError::UnknownTool {
            name: "warp_drive".to_string(),
        };
        let envelope = ToolResponse::failure(&err);
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["status"], json!("error"));
        assert_eq!(wire["error"]["code"], json!("UNKNOWN_TOOL"));
        assert!(wire["error"]["troubleshooting"].is_string());
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn request_defaults_tolerate_missing_fields() {
        let request: ToolCallRequest =
            serde_json::from_value(json!({ "tool": "list_sessions" })).unwrap();
        assert_eq!(request.tool, "list_sessions");
        assert!(request.arguments.is_empty());
        assert!(request.session_id.is_none());
    }
}
