//! Session-lifecycle tools. These manage registry bindings themselves and
//! are registered sessionless; the dispatcher never binds a record for
//! them.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::driver::{BrowserKind, DriverOptions, WindowSize};
use crate::error::ControlError;
use crate::session::SessionRegistry;

pub(super) const BROWSER_KIND_MEMBERS: &[&str] =
    &["chromium", "chromium-like", "chrome", "firefox", "firefox-like"];

fn parse_options(invocation: &Invocation<'_>) -> Result<DriverOptions, ControlError> {
    let mut options = DriverOptions::default();
    if let Some(headless) = invocation.params.get("headless").and_then(Value::as_bool) {
        options.headless = headless;
    }
    if let Some(size) = invocation.params.get("window_size") {
        let w = size.get("w").and_then(Value::as_u64);
        let h = size.get("h").and_then(Value::as_u64);
        match (w, h) {
            (Some(w), Some(h)) if (100..=10_000).contains(&w) && (100..=10_000).contains(&h) => {
                options.window_size = Some(WindowSize {
                    w: w as u32,
                    h: h as u32,
                });
            }
            _ => {
                return Err(ControlError::validation(
                    "window_size",
                    Some(size.to_string()),
                    "expected { w, h } within 100..=10000",
                ))
            }
        }
    }
    if let Some(ua) = invocation.str_param("user_agent") {
        options.user_agent = Some(ua.to_string());
    }
    if let Some(args) = invocation.params.get("extra_args").and_then(Value::as_array) {
        for arg in args {
            match arg.as_str() {
                Some(arg) => options.extra_args.push(arg.to_string()),
                None => {
                    return Err(ControlError::validation(
                        "extra_args",
                        Some(arg.to_string()),
                        "entries must be strings",
                    ))
                }
            }
        }
    }
    Ok(options)
}

pub struct CreateSessionTool {
    sessions: Arc<SessionRegistry>,
}

impl CreateSessionTool {
    pub fn descriptor(sessions: Arc<SessionRegistry>) -> ToolDescriptor {
        ToolDescriptor::new(
            "create_session",
            "session",
            "create_session",
            ParamSchema::new()
                .field(FieldSpec::one_of("browser_kind", BROWSER_KIND_MEMBERS))
                .field(FieldSpec::boolean("headless"))
                .field(FieldSpec::object("window_size"))
                .field(FieldSpec::string("user_agent").max_len(512))
                .field(FieldSpec::array("extra_args")),
            Arc::new(Self { sessions }),
        )
        .sessionless()
    }
}

#[async_trait]
impl ToolHandler for CreateSessionTool {
    async fn run(&self, invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let kind = match invocation.str_param("browser_kind") {
            Some(raw) => Some(raw.parse::<BrowserKind>()?),
            None => None,
        };
        let options = parse_options(&invocation)?;

        let id = self.sessions.create_session(kind, Some(options)).await?;
        let summary = self
            .sessions
            .list()
            .into_iter()
            .find(|s| s.id == id);
        Ok(json!({
            "session_id": id,
            "browser_kind": summary.map(|s| s.browser_kind),
        }))
    }
}

pub struct CloseSessionTool {
    sessions: Arc<SessionRegistry>,
}

impl CloseSessionTool {
    pub fn descriptor(sessions: Arc<SessionRegistry>) -> ToolDescriptor {
        ToolDescriptor::new(
            "close_session",
            "session",
            "close_session",
            ParamSchema::new().field(FieldSpec::string("session_id").required().max_len(64)),
            Arc::new(Self { sessions }),
        )
        .sessionless()
    }
}

#[async_trait]
impl ToolHandler for CloseSessionTool {
    async fn run(&self, invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let id = invocation.required_str("session_id")?;
        let closed = self.sessions.destroy_session(id).await;
        Ok(json!({ "session_id": id, "closed": closed }))
    }
}

pub struct ListSessionsTool {
    sessions: Arc<SessionRegistry>,
}

impl ListSessionsTool {
    pub fn descriptor(sessions: Arc<SessionRegistry>) -> ToolDescriptor {
        ToolDescriptor::new(
            "list_sessions",
            "session",
            "list_sessions",
            ParamSchema::empty(),
            Arc::new(Self { sessions }),
        )
        .sessionless()
    }
}

#[async_trait]
impl ToolHandler for ListSessionsTool {
    async fn run(&self, _invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let sessions = self.sessions.list();
        Ok(json!({
            "count": sessions.len(),
            "cap": self.sessions.cap(),
            "sessions": sessions,
        }))
    }
}

pub struct GetSessionInfoTool {
    sessions: Arc<SessionRegistry>,
}

impl GetSessionInfoTool {
    pub fn descriptor(sessions: Arc<SessionRegistry>) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_session_info",
            "session",
            "get_session_info",
            ParamSchema::new().field(FieldSpec::string("session_id").required().max_len(64)),
            Arc::new(Self { sessions }),
        )
        .sessionless()
    }
}

#[async_trait]
impl ToolHandler for GetSessionInfoTool {
    async fn run(&self, invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let id = invocation.required_str("session_id")?;
        let record = self.sessions.get(id)?;
        let (kind, options) = self
            .sessions
            .creation_options(id)
            .ok_or_else(|| ControlError::SessionNotFound { id: id.to_string() })?;

        let guard = record.lock().await;
        Ok(json!({
            "session_id": guard.id(),
            "browser_kind": kind,
            "created_at": guard.created_wall(),
            "options": options,
            "use_count": guard.use_count(),
            "consecutive_errors": guard.consecutive_errors(),
            "performance": guard.perf(),
            "recent_actions": guard.history().to_vec(),
            "scroll_position": guard.scroll_position(),
            "active_element": guard.active_element(),
        }))
    }
}
