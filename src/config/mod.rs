//! Configuration assembly: defaults ← optional flat config file ← process
//! environment. Both surfaces are closed sets; unrecognized keys fail
//! validation rather than being silently carried.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::auth::{ApiKeyEntry, BearerConfig, ProviderKind, RateLimitSpec};
use crate::error::ControlError;

pub mod types;

pub use types::{
    LogLevel, ServerConfig, DEFAULT_MAX_CONCURRENT_SESSIONS, DEFAULT_PORT,
    DEFAULT_SESSION_TIMEOUT_MS, DEFAULT_WEBDRIVER_ENDPOINT,
};

/// The recognized environment surface. Closed set: these six names and
/// nothing else are consulted.
pub const ENV_VARS: &[&str] = &[
    "BROWSER_TYPE",
    "HEADLESS",
    "MAX_CONCURRENT_SESSIONS",
    "SESSION_TIMEOUT",
    "LOG_LEVEL",
    "PORT",
];

/// Keys the flat config file may carry: the env surface plus the auth
/// provider configuration.
const FILE_KEYS: &[&str] = &[
    "BROWSER_TYPE",
    "HEADLESS",
    "MAX_CONCURRENT_SESSIONS",
    "SESSION_TIMEOUT",
    "LOG_LEVEL",
    "PORT",
    "WEBDRIVER_ENDPOINT",
    "PID_FILE",
    "AUTH_ENABLED",
    "AUTH_PROVIDERS",
    "REQUIRE_SECURE_TRANSPORT",
    "GLOBAL_RATE_LIMIT",
    "PER_IDENTITY_RATE_LIMITS",
    "ADDRESS_ALLOW_LIST",
    "ADDRESS_DENY_LIST",
    "API_KEYS",
    "BEARER",
];

/// A loaded configuration plus the non-fatal findings the startup health
/// check reports (missing env names, for one).
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: ServerConfig,
    pub issues: Vec<String>,
}

/// Assemble the configuration. Invalid values are errors (the CLI maps
/// them to exit code 2); absent optional surface is only an issue note.
pub fn load(file: Option<&Path>) -> Result<ConfigLoad, ControlError> {
    load_with_env(file, |name| std::env::var(name).ok())
}

/// Same assembly with an injected environment, which is what the tests
/// use to stay independent of the host process.
pub fn load_with_env(
    file: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ConfigLoad, ControlError> {
    let mut config = ServerConfig::default();
    let mut issues = Vec::new();

    if let Some(path) = file {
        apply_file(&mut config, path)?;
        debug!(?path, "configuration file applied");
    }

    for &name in ENV_VARS {
        let Some(raw) = env(name) else {
            issues.push(format!("{name} is not set; using default"));
            continue;
        };
        apply_env_value(&mut config, name, &raw)?;
    }
    config.validate()?;

    Ok(ConfigLoad { config, issues })
}

fn apply_env_value(
    config: &mut ServerConfig,
    name: &str,
    raw: &str,
) -> Result<(), ControlError> {
    match name {
        "BROWSER_TYPE" => {
            config.browser_type = raw.parse()?;
        }
        "HEADLESS" => {
            config.headless = parse_bool(name, raw)?;
        }
        "MAX_CONCURRENT_SESSIONS" => {
            let value: usize = raw.parse().map_err(|_| {
                ControlError::validation(name, Some(raw.to_string()), "must be a positive integer")
            })?;
            if value == 0 {
                return Err(ControlError::validation(
                    name,
                    Some(raw.to_string()),
                    "must be a positive integer",
                ));
            }
            config.max_concurrent_sessions = value;
        }
        "SESSION_TIMEOUT" => {
            let ms: u64 = raw.parse().map_err(|_| {
                ControlError::validation(
                    name,
                    Some(raw.to_string()),
                    "must be a number of milliseconds",
                )
            })?;
            config.session_timeout = Duration::from_millis(ms);
        }
        "LOG_LEVEL" => {
            config.log_level = raw.parse()?;
        }
        "PORT" => {
            let port: u16 = raw.parse().map_err(|_| {
                ControlError::validation(name, Some(raw.to_string()), "must be a port number")
            })?;
            config.port = port;
        }
        _ => {}
    }
    Ok(())
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ControlError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ControlError::validation(
            field,
            Some(raw.to_string()),
            "must be `true` or `false`",
        )),
    }
}

fn apply_file(config: &mut ServerConfig, path: &Path) -> Result<(), ControlError> {
    let body = std::fs::read_to_string(path).map_err(|err| {
        ControlError::validation(
            "config_file",
            Some(path.display().to_string()),
            format!("cannot read: {err}"),
        )
    })?;
    let map: HashMap<String, Value> = serde_json::from_str(&body).map_err(|err| {
        ControlError::validation(
            "config_file",
            Some(path.display().to_string()),
            format!("not a flat JSON object: {err}"),
        )
    })?;

    for key in map.keys() {
        if !FILE_KEYS.contains(&key.as_str()) {
            return Err(ControlError::validation(
                key.clone(),
                None,
                "unrecognized configuration key",
            ));
        }
    }

    for (key, value) in &map {
        match key.as_str() {
            "BROWSER_TYPE" | "HEADLESS" | "MAX_CONCURRENT_SESSIONS" | "SESSION_TIMEOUT"
            | "LOG_LEVEL" | "PORT" => {
                let raw = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                apply_env_value(config, key, &raw)?;
            }
            "WEBDRIVER_ENDPOINT" => {
                config.webdriver_endpoint = expect_string(key, value)?;
            }
            "PID_FILE" => {
                config.pid_file = Some(expect_string(key, value)?.into());
            }
            "AUTH_ENABLED" => {
                config.auth.enabled = expect_bool(key, value)?;
            }
            "REQUIRE_SECURE_TRANSPORT" => {
                config.auth.require_secure_transport = expect_bool(key, value)?;
            }
            "AUTH_PROVIDERS" => {
                config.auth.providers = parse_typed::<Vec<ProviderKind>>(key, value)?;
            }
            "GLOBAL_RATE_LIMIT" => {
                config.auth.global_rate_limit = Some(parse_typed::<RateLimitSpec>(key, value)?);
            }
            "PER_IDENTITY_RATE_LIMITS" => {
                config.auth.per_identity_rate_limits =
                    parse_typed::<HashMap<String, RateLimitSpec>>(key, value)?;
            }
            "ADDRESS_ALLOW_LIST" => {
                config.auth.address_allow_list = parse_typed::<Vec<String>>(key, value)?;
            }
            "ADDRESS_DENY_LIST" => {
                config.auth.address_deny_list = parse_typed::<Vec<String>>(key, value)?;
            }
            "API_KEYS" => {
                config.auth.api_keys = parse_typed::<Vec<ApiKeyEntry>>(key, value)?;
            }
            "BEARER" => {
                config.auth.bearer = Some(parse_typed::<BearerConfig>(key, value)?);
            }
            _ => {}
        }
    }

    Ok(())
}

fn expect_string(key: &str, value: &Value) -> Result<String, ControlError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ControlError::validation(key, Some(value.to_string()), "expected a string"))
}

fn expect_bool(key: &str, value: &Value) -> Result<bool, ControlError> {
    value
        .as_bool()
        .ok_or_else(|| ControlError::validation(key, Some(value.to_string()), "expected a boolean"))
}

fn parse_typed<T: serde::de::DeserializeOwned>(
    key: &str,
    value: &Value,
) -> Result<T, ControlError> {
    serde_json::from_value(value.clone())
        .map_err(|err| ControlError::validation(key, None, format!("invalid shape: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn file_values_land_and_unknown_keys_fail() {
        let file = write_config(
            r#"{
                "PORT": 4545,
                "HEADLESS": "false",
                "AUTH_ENABLED": true,
                "API_KEYS": [
                    { "key": "sk-1", "identity": "ci", "roles": ["tester"] }
                ]
            }"#,
        );
        let loaded = load_with_env(Some(file.path()), no_env).unwrap();
        assert_eq!(loaded.config.port, 4545);
        assert!(!loaded.config.headless);
        assert!(loaded.config.auth.enabled);
        assert_eq!(loaded.config.auth.api_keys.len(), 1);

        let bad = write_config(r#"{ "PROT": 4545 }"#);
        let err = load_with_env(Some(bad.path()), no_env).unwrap_err();
        assert!(err.to_string().contains("PROT"));
    }

    #[test]
    fn env_overrides_file_and_missing_env_is_only_an_issue() {
        let file = write_config(r#"{ "PORT": 4545 }"#);
        let loaded = load_with_env(Some(file.path()), |name| match name {
            "PORT" => Some("5050".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(loaded.config.port, 5050);
        assert!(loaded
            .issues
            .iter()
            .any(|i| i.contains("MAX_CONCURRENT_SESSIONS")));

        let defaults = load_with_env(None, no_env).unwrap();
        assert_eq!(defaults.config.port, DEFAULT_PORT);
    }

    #[test]
    fn out_of_range_values_are_validation_errors() {
        let file = write_config(r#"{ "PORT": 80 }"#);
        let err = load_with_env(Some(file.path()), no_env).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Validation);

        let err = load_with_env(None, |name| match name {
            "MAX_CONCURRENT_SESSIONS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Validation);

        let err = load_with_env(None, |name| match name {
            "BROWSER_TYPE" => Some("netscape".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Validation);
    }
}
