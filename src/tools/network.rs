//! Network capture tools: a browser-side hook around fetch/XHR, drained
//! into a HAR-shaped capture.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::capture::{ArtifactKind, ArtifactStore, HarCapture};
use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

pub struct NetworkCaptureStartTool;

impl NetworkCaptureStartTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "network_capture_start",
            "network",
            "network_capture_start",
            ParamSchema::empty(),
            Arc::new(Self),
        )
        .with_script(scripts::NETWORK_CAPTURE_START)
    }
}

#[async_trait]
impl ToolHandler for NetworkCaptureStartTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let fresh = session
            .conn()
            .execute(scripts::NETWORK_CAPTURE_START, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({
            "capturing": true,
            "already_active": fresh == Value::Bool(false),
        }))
    }
}

pub struct NetworkCaptureStopTool {
    artifacts: Arc<ArtifactStore>,
}

impl NetworkCaptureStopTool {
    pub fn descriptor(artifacts: Arc<ArtifactStore>) -> ToolDescriptor {
        ToolDescriptor::new(
            "network_capture_stop",
            "network",
            "network_capture_stop",
            ParamSchema::new().field(FieldSpec::boolean("save")),
            Arc::new(Self { artifacts }),
        )
        .with_script(scripts::NETWORK_CAPTURE_DRAIN)
    }
}

#[async_trait]
impl ToolHandler for NetworkCaptureStopTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let save = invocation.bool_param("save", false);
        let session = invocation.session()?;

        let url = session.conn().current_url().await?;
        let rows = session
            .conn()
            .execute(scripts::NETWORK_CAPTURE_DRAIN, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        if rows.is_null() {
            return Err(ControlError::validation(
                "capture",
                None,
                "no capture is active; call network_capture_start first",
            ));
        }

        let capture = HarCapture::from_hook_rows(&url, &rows);
        let saved_path = if save {
            let body = serde_json::to_string_pretty(&capture)
                .map_err(|err| ControlError::internal(err.to_string()))?;
            let path = self
                .artifacts
                .write_text(ArtifactKind::Report, &url, Some("har"), &body)
                .await?;
            Some(path.display().to_string())
        } else {
            None
        };

        Ok(json!({
            "entries": capture.len(),
            "total_response_bytes": capture.total_response_bytes(),
            "har": capture,
            "saved_path": saved_path,
        }))
    }
}

pub struct NetworkBlockTool;

impl NetworkBlockTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "network_block",
            "network",
            "network_block",
            ParamSchema::new().field(FieldSpec::array("patterns").required()),
            Arc::new(Self),
        )
        .with_script(scripts::NETWORK_BLOCK)
    }
}

#[async_trait]
impl ToolHandler for NetworkBlockTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let patterns = invocation
            .params
            .get("patterns")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if patterns.iter().any(|p| !p.is_string()) {
            return Err(ControlError::validation(
                "patterns",
                None,
                "entries must be strings",
            ));
        }

        let session = invocation.session()?;
        let installed = session
            .conn()
            .execute(
                scripts::NETWORK_BLOCK,
                vec![Value::Array(patterns.clone())],
                SCRIPT_TIMEOUT,
            )
            .await?;
        if installed == Value::Bool(false) {
            return Err(ControlError::validation(
                "capture",
                None,
                "no capture is active; call network_capture_start first",
            ));
        }
        Ok(json!({ "blocked_patterns": patterns }))
    }
}
