//! Media inspection tools, all driven by injected snippets.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

const MEDIA_VERBS: &[&str] = &["play", "pause", "mute", "unmute", "seek", "volume"];

fn no_media(index: i64) -> ControlError {
    ControlError::ElementNotFound {
        selector: format!("media element #{index}"),
    }
}

pub struct MediaDetectTool;

impl MediaDetectTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "media_detect",
            "media",
            "media_detect",
            ParamSchema::empty(),
            Arc::new(Self),
        )
        .with_script(scripts::MEDIA_DETECT)
    }
}

#[async_trait]
impl ToolHandler for MediaDetectTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let media = session
            .conn()
            .execute(scripts::MEDIA_DETECT, Vec::new(), SCRIPT_TIMEOUT)
            .await?;
        let count = media.as_array().map_or(0, Vec::len);
        Ok(json!({ "count": count, "media": media }))
    }
}

pub struct MediaStateTool;

impl MediaStateTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "media_state",
            "media",
            "media_state",
            ParamSchema::new().field(FieldSpec::integer("index").range(0, 1000)),
            Arc::new(Self),
        )
        .with_script(scripts::MEDIA_STATE)
    }
}

#[async_trait]
impl ToolHandler for MediaStateTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let index = invocation.i64_param("index", 0);
        let session = invocation.session()?;
        let state = session
            .conn()
            .execute(scripts::MEDIA_STATE, vec![json!(index)], SCRIPT_TIMEOUT)
            .await?;
        if state.is_null() {
            return Err(no_media(index));
        }
        Ok(json!({ "index": index, "state": state }))
    }
}

pub struct MediaPlaybackCheckTool;

impl MediaPlaybackCheckTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "media_playback_check",
            "media",
            "media_playback_check",
            ParamSchema::new()
                .field(FieldSpec::integer("index").range(0, 1000))
                .field(FieldSpec::integer("sample_ms").range(50, 5000)),
            Arc::new(Self),
        )
        .with_script(scripts::MEDIA_PLAYBACK_PROBE)
    }
}

#[async_trait]
impl ToolHandler for MediaPlaybackCheckTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let index = invocation.i64_param("index", 0);
        let sample_ms = invocation.i64_param("sample_ms", 500) as u64;
        let session = invocation.session()?;
        let conn = session.conn();

        let before = conn
            .execute(scripts::MEDIA_PLAYBACK_PROBE, vec![json!(index)], SCRIPT_TIMEOUT)
            .await?;
        if before.is_null() {
            return Err(no_media(index));
        }
        tokio::time::sleep(Duration::from_millis(sample_ms)).await;
        let after = conn
            .execute(scripts::MEDIA_PLAYBACK_PROBE, vec![json!(index)], SCRIPT_TIMEOUT)
            .await?;
        if after.is_null() {
            return Err(no_media(index));
        }

        let t0 = before.get("currentTimeS").and_then(Value::as_f64).unwrap_or(0.0);
        let t1 = after.get("currentTimeS").and_then(Value::as_f64).unwrap_or(0.0);
        let paused = after.get("paused").and_then(Value::as_bool).unwrap_or(true);

        Ok(json!({
            "index": index,
            "playing": !paused && t1 > t0,
            "advanced_s": t1 - t0,
            "before": before,
            "after": after,
        }))
    }
}

pub struct MediaControlTool;

impl MediaControlTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "media_control",
            "media",
            "media_control",
            ParamSchema::new()
                .field(FieldSpec::integer("index").range(0, 1000))
                .field(FieldSpec::one_of("action", MEDIA_VERBS).required())
                .field(FieldSpec::number("value")),
            Arc::new(Self),
        )
        .with_script(scripts::MEDIA_CONTROL)
    }
}

#[async_trait]
impl ToolHandler for MediaControlTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let index = invocation.i64_param("index", 0);
        let action = invocation.required_str("action")?.to_string();
        let value = invocation
            .params
            .get("value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let session = invocation.session()?;
        let result = session
            .conn()
            .execute(
                scripts::MEDIA_CONTROL,
                vec![json!(index), json!(action), json!(value)],
                SCRIPT_TIMEOUT,
            )
            .await?;
        if result.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(no_media(index));
        }
        Ok(json!({ "index": index, "action": action, "state": result }))
    }
}

pub struct MediaMonitorTool;

impl MediaMonitorTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "media_monitor",
            "media",
            "media_monitor",
            ParamSchema::new()
                .field(FieldSpec::integer("index").range(0, 1000))
                .field(FieldSpec::integer("duration_ms").range(100, 10_000))
                .field(FieldSpec::integer("interval_ms").range(50, 5000)),
            Arc::new(Self),
        )
        .with_script(scripts::MEDIA_PLAYBACK_PROBE)
    }
}

#[async_trait]
impl ToolHandler for MediaMonitorTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let index = invocation.i64_param("index", 0);
        let duration_ms = invocation.i64_param("duration_ms", 2000) as u64;
        let interval_ms = invocation.i64_param("interval_ms", 500).max(50) as u64;

        let session = invocation.session()?;
        let conn = session.conn();
        let mut samples = Vec::new();
        let started = std::time::Instant::now();

        loop {
            let sample = conn
                .execute(scripts::MEDIA_PLAYBACK_PROBE, vec![json!(index)], SCRIPT_TIMEOUT)
                .await?;
            if sample.is_null() {
                return Err(no_media(index));
            }
            samples.push(json!({
                "at_ms": started.elapsed().as_millis() as u64,
                "state": sample,
            }));
            if started.elapsed().as_millis() as u64 >= duration_ms {
                break;
            }
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }

        Ok(json!({ "index": index, "samples": samples }))
    }
}
