//! Condition tools: presence checks and bounded waits.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::with_stale_retry;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_WAIT_MS: i64 = 10_000;

pub struct WaitForElementTool;

impl WaitForElementTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "wait_for_element",
            "conditions",
            "wait_for_element",
            ParamSchema::new()
                .field(FieldSpec::selector("selector").required())
                .field(FieldSpec::integer("timeout_ms").range(100, 60_000)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for WaitForElementTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let timeout = Duration::from_millis(
            invocation.i64_param("timeout_ms", DEFAULT_WAIT_MS).max(0) as u64,
        );

        let session = invocation.session()?;
        let conn = session.conn();
        let started = Instant::now();

        loop {
            if conn.exists(&selector).await? {
                return Ok(json!({
                    "found": true,
                    "selector": selector.to_string(),
                    "waited_ms": started.elapsed().as_millis() as u64,
                }));
            }
            if started.elapsed() >= timeout {
                return Err(ControlError::Timeout {
                    operation: format!("wait for `{selector}`"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }
}

pub struct ElementExistsTool;

impl ElementExistsTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "element_exists",
            "conditions",
            "element_exists",
            ParamSchema::new().field(FieldSpec::selector("selector").required()),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ElementExistsTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let selector = invocation.selector_param("selector")?;
        let session = invocation.session()?;
        let conn = session.conn();

        let exists = with_stale_retry(|| conn.exists(&selector)).await?;
        Ok(json!({ "selector": selector.to_string(), "exists": exists }))
    }
}
