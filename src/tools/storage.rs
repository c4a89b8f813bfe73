//! Storage tools: cookies via the WebDriver endpoints, web storage via
//! injected snippets.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{FieldSpec, Invocation, ParamSchema, ToolDescriptor, ToolHandler};
use crate::driver::CookieSpec;
use crate::error::ControlError;

use super::{scripts, SCRIPT_TIMEOUT};

const STORAGE_AREAS: &[&str] = &["local", "session"];

pub struct GetCookiesTool;

impl GetCookiesTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_cookies",
            "storage",
            "get_cookies",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for GetCookiesTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        let cookies = session.conn().cookies().await?;
        Ok(json!({ "count": cookies.len(), "cookies": cookies }))
    }
}

pub struct SetCookieTool;

impl SetCookieTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "set_cookie",
            "storage",
            "set_cookie",
            ParamSchema::new()
                .field(FieldSpec::string("name").required().max_len(256))
                .field(FieldSpec::string("value").required().max_len(4096))
                .field(FieldSpec::string("path").max_len(1024))
                .field(FieldSpec::string("domain").max_len(256))
                .field(FieldSpec::boolean("secure"))
                .field(FieldSpec::integer("expiry").range(0, 4_102_444_800)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for SetCookieTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let cookie = CookieSpec {
            name: invocation.required_str("name")?.to_string(),
            value: invocation.required_str("value")?.to_string(),
            path: invocation.str_param("path").map(str::to_string),
            domain: invocation.str_param("domain").map(str::to_string),
            secure: invocation.params.get("secure").and_then(Value::as_bool),
            expiry: invocation.params.get("expiry").and_then(Value::as_i64),
        };
        let name = cookie.name.clone();

        let session = invocation.session()?;
        session.conn().add_cookie(cookie).await?;
        Ok(json!({ "set": name }))
    }
}

pub struct DeleteCookieTool;

impl DeleteCookieTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "delete_cookie",
            "storage",
            "delete_cookie",
            ParamSchema::new().field(FieldSpec::string("name").required().max_len(256)),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for DeleteCookieTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let name = invocation.required_str("name")?.to_string();
        let session = invocation.session()?;
        session.conn().delete_cookie(&name).await?;
        Ok(json!({ "deleted": name }))
    }
}

pub struct ClearCookiesTool;

impl ClearCookiesTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "clear_cookies",
            "storage",
            "clear_cookies",
            ParamSchema::empty(),
            Arc::new(Self),
        )
    }
}

#[async_trait]
impl ToolHandler for ClearCookiesTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let session = invocation.session()?;
        session.conn().clear_cookies().await?;
        Ok(json!({ "cleared": true }))
    }
}

pub struct GetStorageTool;

impl GetStorageTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_storage",
            "storage",
            "get_storage",
            ParamSchema::new().field(FieldSpec::one_of("area", STORAGE_AREAS)),
            Arc::new(Self),
        )
        .with_script(scripts::STORAGE_GET)
    }
}

#[async_trait]
impl ToolHandler for GetStorageTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let area = invocation.str_param("area").unwrap_or("local").to_string();
        let session = invocation.session()?;
        let entries = session
            .conn()
            .execute(scripts::STORAGE_GET, vec![json!(area)], SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({ "area": area, "entries": entries }))
    }
}

pub struct SetStorageItemTool;

impl SetStorageItemTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "set_storage_item",
            "storage",
            "set_storage_item",
            ParamSchema::new()
                .field(FieldSpec::one_of("area", STORAGE_AREAS))
                .field(FieldSpec::string("key").required().max_len(1024))
                .field(FieldSpec::string("value").required().max_len(65_536)),
            Arc::new(Self),
        )
        .with_script(scripts::STORAGE_SET)
    }
}

#[async_trait]
impl ToolHandler for SetStorageItemTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let area = invocation.str_param("area").unwrap_or("local").to_string();
        let key = invocation.required_str("key")?.to_string();
        let value = invocation.required_str("value")?.to_string();

        let session = invocation.session()?;
        session
            .conn()
            .execute(
                scripts::STORAGE_SET,
                vec![json!(area), json!(key), json!(value)],
                SCRIPT_TIMEOUT,
            )
            .await?;
        Ok(json!({ "area": area, "key": key }))
    }
}

pub struct ClearStorageTool;

impl ClearStorageTool {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "clear_storage",
            "storage",
            "clear_storage",
            ParamSchema::new().field(FieldSpec::one_of("area", STORAGE_AREAS)),
            Arc::new(Self),
        )
        .with_script(scripts::STORAGE_CLEAR)
    }
}

#[async_trait]
impl ToolHandler for ClearStorageTool {
    async fn run(&self, mut invocation: Invocation<'_>) -> Result<Value, ControlError> {
        let area = invocation.str_param("area").unwrap_or("local").to_string();
        let session = invocation.session()?;
        session
            .conn()
            .execute(scripts::STORAGE_CLEAR, vec![json!(area)], SCRIPT_TIMEOUT)
            .await?;
        Ok(json!({ "area": area, "cleared": true }))
    }
}
