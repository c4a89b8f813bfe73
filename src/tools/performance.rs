//! Performance tools: navigation timing, resource samples, and a render
//! analysis pass.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

pub struct PerformanceMetricsTool;

impl PerformanceMetricsTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "performance_metrics",
            "performance",
            "performance_metrics",
            ParamSchema::empty(),
            Arc::new(Self),
        )
        .with_script(scripts::PERFORMANCE_METRICS)
    }
}

#[async_trait]
impl ToolHandler for PerformanceMetricsTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let metrics = session
            .conn()
            .execute(scripts::PERFORMANCE_METRICS, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({ "metrics": metrics }))
    }
}

pub struct PerformanceResourceSampleTool;

impl PerformanceResourceSampleTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "performance_resource_sample",
            "performance",
            "performance_resource_sample",
            ParamSchema::new().field(FieldSpec::integer("limit").range(1, 1000)),
            Arc::new(Self),
        )
        .with_script(scripts::PERFORMANCE_RESOURCES)
    }
}

#[async_trait]
impl ToolHandler for PerformanceResourceSampleTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let limit = invocation.i64_param("limit", 100);
        let session = invocation.session()?;
        let resources = session
            .conn()
            .execute(
                scripts::PERFORMANCE_RESOURCES,
                vec![json!(limit)],
                SCRIPT_TIMEOUT,
            )
            .await?;
        let count = resources.as_array().map_or(0, Vec::len);
        Ok(json!({ "count": count, "resources": resources }))
    }
}

pub struct PerformanceRenderAnalysisTool;

impl PerformanceRenderAnalysisTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "performance_render_analysis",
            "performance",
            "performance_render_analysis",
            ParamSchema::empty(),
            Arc::new(Self),
        )
        .with_script(scripts::RENDER_ANALYSIS)
    }
}

#[async_trait]
impl ToolHandler for PerformanceRenderAnalysisTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let analysis = session
            .conn()
            .execute(scripts::RENDER_ANALYSIS, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({ "analysis": analysis }))
    }
}
