//! Frame tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

pub struct ListFramesTool;

impl ListFramesTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "list_frames",
            "frames",
            "list_frames",
            ParamSchema::empty(),
            Arc::new(Self),
        )
        .with_script(scripts::LIST_FRAMES)
    }
}

#[async_trait]
impl ToolHandler for ListFramesTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let frames = session
            .conn()
            .execute(scripts::LIST_FRAMES, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({ "frames": frames }))
    }
}

pub struct SwitchFrameTool;

impl SwitchFrameTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "switch_frame",
            "frames",
            "switch_frame",
            ParamSchema::new().field(FieldSpec::selector("selector").required()),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for SwitchFrameTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let session = invocation.session()?;
        session.conn().switch_frame(&selector).await?;
        Ok(json!({ "frame": selector.to_string() }))
    }
}

pub struct ParentFrameTool;

impl ParentFrameTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "parent_frame",
            "frames",
            "parent_frame",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ParentFrameTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        session.conn().parent_frame().await?;
        Ok(json!({ "frame": "parent" }))
    }
}

pub struct ExecuteInFrameTool;

impl ExecuteInFrameTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "execute_in_frame",
            "frames",
            "execute_in_frame",
            ParamSchema::new()
                .field(FieldSpec::selector("selector").required())
                .field(FieldSpec::string("script").required().max_len(65_536)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ExecuteInFrameTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let script = invocation.required_str("script")?.to_string();
        let session = invocation.session()?;
        let conn = session.conn();

        conn.switch_frame(&selector).await?;
        let result = conn.execute(&script, Vec::new(), SCRIPT_TIMEOUT).await;
        // Always climb back out, even when the script failed.
        let restore = conn.parent_frame().await;

        let value = result?;
        restore?;
        Ok(json!({ "frame": selector.to_string(), "value": value }))
    }
}
