//! Tool dispatcher: the strictly ordered pipeline every call walks.
//!
//! Resolve the descriptor, pass the auth gate, resolve the session, validate
//! parameters, invoke the handler under the session's exclusive lock, record
//! the outcome, and shape the response envelope. The pipeline is total: every
//! failure becomes a coded error envelope, never a panic across a component
//! boundary, and nothing here retries.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

use crate::auth::AuthGate;
use crate::error::{ControlError, ErrorCode};
use crate::session::SessionRegistry;
use crate::shutdown::Lifecycle;

pub mod descriptor;
pub mod envelope;
pub mod schema;

pub use descriptor::{Invocation, ToolDescriptor, ToolHandler, ToolRegistry};
pub use envelope::{ResponseStatus, ToolCallRequest, ToolResponse};
pub use schema::{FieldSpec, FieldType, ParamSchema, ALLOWED_URL_SCHEMES};

pub struct Dispatcher {
    tools: ToolRegistry,
    auth: Arc<AuthGate>,
    sessions: Arc<SessionRegistry>,
    lifecycle: Arc<Lifecycle>,
}

impl Dispatcher {
    pub fn new(
        tools: ToolRegistry,
        auth: Arc<AuthGate>,
        sessions: Arc<SessionRegistry>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            tools,
            auth,
            sessions,
            lifecycle,
        }
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.names()
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Run one call to completion and shape the envelope.
    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolResponse {
        let span = info_span!("tool_call", tool = %request.tool);
        match self.run(&request).instrument(span).await {
            Ok(data) => ToolResponse::success(data),
            Err(err) => {
                debug!(tool = %request.tool, code = %err.code(), "tool call failed");
                ToolResponse::failure(&err)
            }
        }
    }

    async fn run(&self, request: &ToolCallRequest) -> Result<Value, ControlError> {
        // Intake gate first: a draining server does no further work.
        let _in_flight = self.lifecycle.enter().await?;

        // 1. Resolve the descriptor.
        let descriptor = self
            .tools
            .get(&request.tool)
            .ok_or_else(|| ControlError::UnknownTool {
                name: request.tool.clone(),
            })?;

        // 2. Authenticate, then authorize the declared (resource, action).
        let auth_ctx = self.auth.authenticate(&request.auth).await?;
        self.auth
            .authorize(&auth_ctx, descriptor.resource, descriptor.action)?;

        // 3. Resolve the target session id (lookup is fatal on a miss; the
        //    record itself is bound only after validation passes).
        let session_id = if descriptor.needs_session {
            let id = match &request.session_id {
                Some(id) => {
                    self.sessions.get(id)?;
                    id.clone()
                }
                None => self
                    .sessions
                    .pick_default()
                    .ok_or_else(|| ControlError::SessionNotFound {
                        id: "(no active session)".to_string(),
                    })?,
            };
            Some(id)
        } else {
            None
        };

        // 4. Validate parameters against the declared schema.
        descriptor.schema.validate(&request.arguments)?;

        // 5. Invoke, holding the record exclusively; 6. record the outcome.
        match session_id {
            Some(id) => {
                let record = self.sessions.get(&id)?;
                let started = Instant::now();
                let outcome = {
                    let mut guard = record.lock().await;
                    descriptor
                        .handler
                        .run(Invocation {
                            params: &request.arguments,
                            session: Some(&mut *guard),
                            auth: &auth_ctx,
                        })
                        .await
                };
                let duration_ms = started.elapsed().as_millis() as u64;

                let selector = request
                    .arguments
                    .get("selector")
                    .and_then(Value::as_str)
                    .map(String::from);
                // The registry applies the error-streak policy here; a
                // session can be retired out from under its name.
                let _ = self
                    .sessions
                    .track_action(&id, descriptor.name, selector, outcome.is_ok(), duration_ms)
                    .await;

                if let Err(err) = &outcome {
                    if err.code() == ErrorCode::TransportLost {
                        // The browser is gone; retire the binding now rather
                        // than letting the next caller trip over it.
                        self.sessions.destroy_failed_session(&id).await;
                    }
                }

                outcome
            }
            None => {
                descriptor
                    .handler
                    .run(Invocation {
                        params: &request.arguments,
                        session: None,
                        auth: &auth_ctx,
                    })
                    .await
            }
        }
    }
}
