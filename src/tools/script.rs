//! Script-execution tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

const SCRIPT_CAP: usize = 65_536;

pub struct EvaluateTool;

impl EvaluateTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "evaluate",
            "script",
            "evaluate",
            ParamSchema::new()
                .field(FieldSpec::string("expression").required().max_len(SCRIPT_CAP)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for EvaluateTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let expression = invocation.required_str("expression")?.to_string();
        let session = invocation.session()?;

        let wrapped = format!("return ({expression});");
        let value = session
            .conn()
            .execute(&wrapped, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({ "value": value }))
    }
}

pub struct ExecuteScriptTool;

impl ExecuteScriptTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "execute_script",
            "script",
            "execute_script",
            ParamSchema::new()
                .field(FieldSpec::string("script").required().max_len(SCRIPT_CAP))
                .field(FieldSpec::array("args")),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ExecuteScriptTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let script = invocation.required_str("script")?.to_string();
        let args = invocation
            .params
            .get("args")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let session = invocation.session()?;
        let value = session.conn().execute(&script, args, SCRIPT_TIMEOUT).await?;
        Ok(json!({ "value": value }))
    }
}

pub struct InjectScriptTagTool;

impl InjectScriptTagTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "inject_script_tag",
            "script",
            "inject_script_tag",
            ParamSchema::new()
                .field(FieldSpec::url("src"))
                .field(FieldSpec::string("text").max_len(SCRIPT_CAP)),
            Arc::new(Self),
        )
        .with_script(scripts::INJECT_SCRIPT_TAG)
    }
}

#[async_trait]
impl ToolHandler for InjectScriptTagTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let src = invocation.str_param("src").map(str::to_string);
        let text = invocation.str_param("text").map(str::to_string);
        if src.is_none() && text.is_none() {
            return Err(ControlError::validation(
                "src",
                None,
                "either `src` or `text` is required",
            ));
        }

        let session = invocation.session()?;
        session
            .conn()
            .execute(
                scripts::INJECT_SCRIPT_TAG,
                vec![json!(src), json!(text)],
                SCRIPT_TIMEOUT,
            )
            .await?;
        Ok(json!({ "injected": true, "src": src }))
    }
}
