//! Browser-dialog tools. Dialog round trips get a short deadline of their
//! own; a hung modal should fail the call, not the session.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::driver::DriverResult;
use crate::error::ControlError;

use super::DIALOG_TIMEOUT;

async fn with_dialog_deadline<T, F>(operation: &str, fut: F) -> Result<T, ControlError>
where
    F: Future<Output = DriverResult<T>>,
{
    match tokio::time::timeout(DIALOG_TIMEOUT, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ControlError::Timeout {
            operation: operation.to_string(),
            timeout_ms: DIALOG_TIMEOUT.as_millis() as u64,
        }),
    }
}

pub struct DialogAcceptTool;

impl DialogAcceptTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "dialog_accept",
            "dialogs",
            "dialog_accept",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for DialogAcceptTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        with_dialog_deadline("dialog accept", session.conn().dialog_accept()).await?;
        Ok(json!({ "accepted": true }))
    }
}

pub struct DialogDismissTool;

impl DialogDismissTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "dialog_dismiss",
            "dialogs",
            "dialog_dismiss",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for DialogDismissTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        with_dialog_deadline("dialog dismiss", session.conn().dialog_dismiss()).await?;
        Ok(json!({ "dismissed": true }))
    }
}

pub struct DialogGetTextTool;

impl DialogGetTextTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "dialog_get_text",
            "dialogs",
            "dialog_get_text",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for DialogGetTextTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let text = with_dialog_deadline("dialog read", session.conn().dialog_text()).await?;
        Ok(json!({ "text": text }))
    }
}

pub struct DialogSendTextTool;

impl DialogSendTextTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "dialog_send_text",
            "dialogs",
            "dialog_send_text",
            ParamSchema::new().field(FieldSpec::string("text").required().max_len(4096)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for DialogSendTextTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let text = invocation.required_str("text")?.to_string();
        let session = invocation.session()?;
        with_dialog_deadline("dialog respond", session.conn().dialog_send_text(&text)).await?;
        Ok(json!({ "sent": true }))
    }
}
