//! Extraction tools: page content, element text/attributes/CSS, and
//! screenshots.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::capture::{ArtifactKind, ArtifactStore};
use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::with_stale_retry;

pub struct GetPageContentTool {
    artifacts: Arc<ArtifactStore>,
}

impl GetPageContentTool {
    pub fn descriptor(artifacts: Arc<ArtifactStore>) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_page_content",
            "extraction",
            "get_page_content",
            ParamSchema::new().field(FieldSpec::boolean("save")),
            Arc::new(Self { artifacts }),
        )
    }
}

#[async_trait]
impl ToolHandler for GetPageContentTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let save = invocation.bool_param("save", false);
        let session = invocation.session()?;

        let url = session.conn().current_url().await?;
        let source = session.conn().page_source().await?;

        let saved_path = if save {
            let path = self
                .artifacts
                .write_text(ArtifactKind::PageCapture, &url, None, &source)
                .await?;
            Some(path.display().to_string())
        } else {
            None
        };

        Ok(json!({
            "url": url,
            "length": source.len(),
            "content": source,
            "saved_path": saved_path,
        }))
    }
}

pub struct GetElementTextTool;

impl GetElementTextTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_element_text",
            "extraction",
            "get_element_text",
            ParamSchema::new().field(FieldSpec::selector("selector").required()),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for GetElementTextTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let session = invocation.session()?;
        let conn = session.conn();

        // An idempotent find; the one place a stale element may be retried.
        let text = with_stale_retry(|| conn.element_text(&selector)).await?;
        Ok(json!({ "selector": selector.to_string(), "text": text }))
    }
}

pub struct GetElementAttributeTool;

impl GetElementAttributeTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_element_attribute",
            "extraction",
            "get_element_attribute",
            ParamSchema::new()
                .field(FieldSpec::selector("selector").required())
                .field(FieldSpec::string("name").required().max_len(256)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for GetElementAttributeTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let name = invocation.required_str("name")?.to_string();
        let session = invocation.session()?;
        let conn = session.conn();

        let value = with_stale_retry(|| conn.element_attr(&selector, &name)).await?;
        Ok(json!({ "selector": selector.to_string(), "name": name, "value": value }))
    }
}

pub struct GetElementCssTool;

impl GetElementCssTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_element_css",
            "extraction",
            "get_element_css",
            ParamSchema::new()
                .field(FieldSpec::selector("selector").required())
                .field(FieldSpec::string("property").required().max_len(128)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for GetElementCssTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let property = invocation.required_str("property")?.to_string();
        let session = invocation.session()?;
        let conn = session.conn();

        let value = with_stale_retry(|| conn.element_css(&selector, &property)).await?;
        Ok(json!({ "selector": selector.to_string(), "property": property, "value": value }))
    }
}

pub struct TakeScreenshotTool {
    artifacts: Arc<ArtifactStore>,
}

impl TakeScreenshotTool {
    pub fn descriptor(artifacts: Arc<ArtifactStore>) -> ToolDescriptor {
        ToolDescriptor::new(
            "take_screenshot",
            "extraction",
            "take_screenshot",
            ParamSchema::new()
                .field(FieldSpec::file_stem("name"))
                .field(FieldSpec::boolean("save")),
            Arc::new(Self { artifacts }),
        )
    }
}

#[async_trait]
impl ToolHandler for TakeScreenshotTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let stem = invocation.str_param("name").map(str::to_string);
        let save = invocation.bool_param("save", true);
        let session = invocation.session()?;

        let url = session.conn().current_url().await?;
        let png = session.conn().screenshot().await?;
        // The transport hands screenshots over base64-encoded; keep that
        // intermediate for the response and decode it for disk.
        let encoded = BASE64.encode(&png);

        let saved_path = if save {
            let path = self
                .artifacts
                .write_base64(ArtifactKind::Screenshot, &url, stem.as_deref(), &encoded)
                .await?;
            Some(path.display().to_string())
        } else {
            None
        };

        Ok(json!({
            "url": url,
            "bytes": png.len(),
            "data_base64": if save { Value::Null } else { Value::String(encoded) },
            "saved_path": saved_path,
        }))
    }
}
