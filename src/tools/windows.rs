//! Window management tools.
//!
//! Placement contract: wholly off-screen rects are accepted; the driver
//! clamps them, and the response reports the rect it actually applied.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::driver::WindowRect;
use crate::error::ControlError;

fn rect_from_params(invocation: &Invocation<'_>) -> Option<WindowRect> {
    let x = invocation.params.get("x").and_then(Value::as_i64);
    let y = invocation.params.get("y").and_then(Value::as_i64);
    let width = invocation.params.get("width").and_then(Value::as_i64);
    let height = invocation.params.get("height").and_then(Value::as_i64);
    match (x, y, width, height) {
        (Some(x), Some(y), Some(width), Some(height)) => Some(WindowRect {
            x,
            y,
            width: width as u32,
            height: height as u32,
        }),
        _ => None,
    }
}

pub struct ListWindowsTool;

impl ListWindowsTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "list_windows",
            "windows",
            "list_windows",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ListWindowsTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let windows = session.conn().windows().await?;
        let active = session.conn().active_window().await?;
        Ok(json!({ "windows": windows, "active": active }))
    }
}

pub struct SwitchWindowTool;

impl SwitchWindowTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "switch_window",
            "windows",
            "switch_window",
            ParamSchema::new().field(FieldSpec::string("handle").required().max_len(128)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for SwitchWindowTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let handle = invocation.required_str("handle")?.to_string();
        let session = invocation.session()?;
        session.conn().switch_window(&handle).await?;
        Ok(json!({ "active": handle }))
    }
}

pub struct OpenWindowTool;

impl OpenWindowTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "open_window",
            "windows",
            "open_window",
            ParamSchema::new()
                .field(FieldSpec::boolean("as_tab"))
                .field(FieldSpec::integer("x").range(-100_000, 100_000))
                .field(FieldSpec::integer("y").range(-100_000, 100_000))
                .field(FieldSpec::integer("width").range(100, 10_000))
                .field(FieldSpec::integer("height").range(100, 10_000)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for OpenWindowTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let as_tab = invocation.bool_param("as_tab", false);
        let requested = rect_from_params(&invocation);

        let session = invocation.session()?;
        let handle = session.conn().open_window(as_tab).await?;
        session.conn().switch_window(&handle).await?;

        let applied = match requested {
            Some(rect) => Some(session.conn().set_window_rect(rect).await?),
            None => None,
        };

        Ok(json!({ "handle": handle, "as_tab": as_tab, "applied_rect": applied }))
    }
}

pub struct CloseWindowTool;

impl CloseWindowTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "close_window",
            "windows",
            "close_window",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for CloseWindowTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        session.conn().close_window().await?;
        let remaining = session.conn().windows().await?;
        Ok(json!({ "remaining": remaining }))
    }
}

pub struct SetWindowRectTool;

impl SetWindowRectTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "set_window_rect",
            "windows",
            "set_window_rect",
            ParamSchema::new()
                .field(FieldSpec::integer("x").required().range(-100_000, 100_000))
                .field(FieldSpec::integer("y").required().range(-100_000, 100_000))
                .field(FieldSpec::integer("width").required().range(100, 10_000))
                .field(FieldSpec::integer("height").required().range(100, 10_000)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for SetWindowRectTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let Some(requested) = rect_from_params(&invocation) else {
            return Err(ControlError::validation(
                "x",
                None,
                "x, y, width, and height are all required",
            ));
        };

        let session = invocation.session()?;
        let applied = session.conn().set_window_rect(requested).await?;
        Ok(json!({
            "requested": requested,
            "applied": applied,
            "clamped": applied != requested,
        }))
    }
}
