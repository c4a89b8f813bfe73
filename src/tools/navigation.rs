//! Navigation tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::NAVIGATION_TIMEOUT;

pub struct NavigateTool;

impl NavigateTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "navigate",
            "navigation",
            "navigate",
            ParamSchema::new()
                .field(FieldSpec::url("url").required())
                .field(FieldSpec::integer("timeout_ms").range(100, 120_000)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for NavigateTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let url = invocation.required_str("url")?.to_string();
        let timeout = Duration::from_millis(
            invocation.i64_param("timeout_ms", NAVIGATION_TIMEOUT.as_millis() as i64) as u64,
        );

        let session = invocation.session()?;
        session.conn().navigate(&url, timeout).await?;
        let landed = session.conn().current_url().await?;
        let title = session.conn().title().await.unwrap_or_default();
        Ok(json!({ "url": landed, "title": title }))
    }
}

pub struct BackTool;

impl BackTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("back", "navigation", "back", ParamSchema::empty(), Arc::new(Self))
    }
}

#[async_trait]
impl ToolHandler for BackTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        session.conn().back().await?;
        Ok(json!({ "url": session.conn().current_url().await? }))
    }
}

pub struct ForwardTool;

impl ForwardTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "forward",
            "navigation",
            "forward",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ForwardTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        session.conn().forward().await?;
        Ok(json!({ "url": session.conn().current_url().await? }))
    }
}

pub struct ReloadTool;

impl ReloadTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "reload",
            "navigation",
            "reload",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ReloadTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        session.conn().reload().await?;
        Ok(json!({ "url": session.conn().current_url().await? }))
    }
}

pub struct GetCurrentUrlTool;

impl GetCurrentUrlTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_current_url",
            "navigation",
            "get_current_url",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for GetCurrentUrlTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        Ok(json!({
            "url": session.conn().current_url().await?,
            "title": session.conn().title().await?,
        }))
    }
}
