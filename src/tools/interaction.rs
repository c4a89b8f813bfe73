//! DOM interaction tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

pub struct ClickTool;

impl ClickTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "click",
            "interaction",
            "click",
            ParamSchema::new().field(FieldSpec::selector("selector").required()),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ClickTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let session = invocation.session()?;
        session.conn().click(&selector).await?;
        session.set_active_element(selector.to_string());
        Ok(json!({ "clicked": selector.to_string() }))
    }
}

pub struct TypeTool;

impl TypeTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "type",
            "interaction",
            "type",
            ParamSchema::new()
                .field(FieldSpec::selector("selector").required())
                .field(FieldSpec::string("text").required().max_len(16_384))
                .field(FieldSpec::boolean("clear")),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for TypeTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let text = invocation.required_str("text")?.to_string();
        let clear = invocation.bool_param("clear", true);

        let session = invocation.session()?;
        session.conn().type_text(&selector, &text, clear).await?;
        session.set_active_element(selector.to_string());
        Ok(json!({ "typed_chars": text.chars().count(), "selector": selector.to_string() }))
    }
}

pub struct SelectTool;

impl SelectTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "select",
            "interaction",
            "select",
            ParamSchema::new()
                .field(FieldSpec::selector("selector").required())
                .field(FieldSpec::string("value").required().max_len(1024)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for SelectTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let value = invocation.required_str("value")?.to_string();

        let session = invocation.session()?;
        session.conn().select_value(&selector, &value).await?;
        session.set_active_element(selector.to_string());
        Ok(json!({ "selected": value, "selector": selector.to_string() }))
    }
}

pub struct HoverTool;

impl HoverTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "hover",
            "interaction",
            "hover",
            ParamSchema::new().field(FieldSpec::selector("selector").required()),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for HoverTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let session = invocation.session()?;
        session.conn().hover(&selector).await?;
        session.set_active_element(selector.to_string());
        Ok(json!({ "hovered": selector.to_string() }))
    }
}

pub struct ScrollTool;

impl ScrollTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "scroll",
            "interaction",
            "scroll",
            ParamSchema::new()
                .field(FieldSpec::selector("selector"))
                .field(FieldSpec::integer("x").range(-1_000_000, 1_000_000))
                .field(FieldSpec::integer("y").range(-1_000_000, 1_000_000)),
            Arc::new(Self),
        )
        .with_script(scripts::SCROLL)
    }
}

#[async_trait]
impl ToolHandler for ScrollTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.str_param("selector").map(str::to_string);
        let x = invocation.i64_param("x", 0);
        let y = invocation.i64_param("y", 0);

        let session = invocation.session()?;
        let result = session
            .conn()
            .execute(
                scripts::SCROLL,
                vec![json!(selector), json!(x), json!(y)],
                SCRIPT_TIMEOUT,
            )
            .await?;

        if result.get("ok").and_then(Value::as_bool) == Some(false) {
            return Err(ControlError::ElementNotFound {
                selector: selector.unwrap_or_default(),
            });
        }

        let landed_x = result.get("x").and_then(Value::as_i64).unwrap_or(0);
        let landed_y = result.get("y").and_then(Value::as_i64).unwrap_or(0);
        session.set_scroll_position(landed_x, landed_y);
        Ok(json!({ "x": landed_x, "y": landed_y }))
    }
}
