//! Tool descriptors and the registration table.
//!
//! Every recognized tool is one descriptor: name, the `(resource, action)`
//! pair the auth gate checks, an explicit parameter schema, and the
//! handler. Browser-side snippets a tool injects ride along as data on the
//! descriptor so they stay auditable in one place.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::schema::ParamSchema;
use crate::auth::AuthContext;
use crate::driver::Selector;
use crate::error::ControlError;
use crate::session::SessionRecord;

/// Everything a handler gets to work with. The session, when present, is
/// held exclusively for the duration of the call.
pub struct Invocation<'a> {
    pub params: &'a Map<String, Value>,
    pub session: Option<&'a mut SessionRecord>,
    pub auth: &'a AuthContext,
}

impl<'a> Invocation<'a> {
    /// The bound session; handlers on session tools may rely on it.
    pub fn session(&mut self) -> Result<&mut SessionRecord, ControlError> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(ControlError::internal(
                "tool requires a session but none was bound",
            )),
        }
    }

    #[must_use]
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn bool_param(&self, name: &str, default: bool) -> bool {
        self.params
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    #[must_use]
    pub fn i64_param(&self, name: &str, default: i64) -> i64 {
        self.params
            .get(name)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    /// Required string parameter; schema validation makes absence a
    /// programmer error, but surface it gracefully anyway.
    pub fn required_str(&self, name: &str) -> Result<&str, ControlError> {
        self.str_param(name)
            .ok_or_else(|| ControlError::validation(name, None, "required parameter is missing"))
    }

    pub fn selector_param(&self, name: &str) -> Result<Selector, ControlError> {
        Ok(Selector::parse(self.required_str(name)?))
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, invocation: Invocation<'_>) -> Result<Value, ControlError>;
}

/// One registered tool.
pub struct ToolDescriptor {
    pub name: &'static str,
    pub resource: &'static str,
    pub action: &'static str,
    pub schema: ParamSchema,
    /// Session-lifecycle tools manage bindings themselves and skip the
    /// dispatcher's session resolution.
    pub needs_session: bool,
    /// Browser-side snippet shipped with the tool, if it injects one.
    pub injected_script: Option<&'static str>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: &'static str,
        resource: &'static str,
        action: &'static str,
        schema: ParamSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name,
            resource,
            action,
            schema,
            needs_session: true,
            injected_script: None,
            handler,
        }
    }

    /// Mark the tool as self-contained (no session binding).
    #[must_use]
    pub fn sessionless(mut self) -> Self {
        self.needs_session = false;
        self
    }

    #[must_use]
    pub fn with_script(mut self, script: &'static str) -> Self {
        self.injected_script = Some(script);
        self
    }
}

/// Name → descriptor table the dispatcher resolves against.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolDescriptor>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        if self.tools.insert(descriptor.name, descriptor).is_some() {
            warn!("tool registered twice; later registration wins");
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Sorted tool names, for the catalog surface and error hints.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
