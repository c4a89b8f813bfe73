//! Permission and auth gate.
//!
//! Every tool call passes through here twice: once to authenticate the
//! caller (provider chain, address filters, transport policy, rate
//! limits) and once to authorize the tool's declared `(resource, action)`
//! against the caller's permissions. Both halves are cheap and lock-light;
//! no gate lock is ever held across a driver call.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ControlError;

pub mod address;
pub mod audit;
pub mod permissions;
pub mod providers;
pub mod rate_limit;

pub use audit::{AuditEvent, AuditLog, AUDIT_LOG_CAP};
pub use permissions::{pattern_matches, Permission, Role, RoleRegistry};
pub use providers::{
    key_prefix, ApiKeyEntry, BearerConfig, ProviderKind, ProviderOutcome, ResolvedIdentity,
    TokenIntrospector,
};
pub use rate_limit::{RateGate, RateLimitSpec, RateScope};

/// Closed configuration surface for the gate. Deserializable from the
/// config file but never serialized back out, so key material stays put.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// When false, every request receives a synthetic unauthenticated
    /// context with a full wildcard grant.
    pub enabled: bool,
    /// Providers tried in order; first success wins.
    pub providers: Vec<ProviderKind>,
    pub require_secure_transport: bool,
    #[serde(default)]
    pub global_rate_limit: Option<RateLimitSpec>,
    #[serde(default)]
    pub per_identity_rate_limits: HashMap<String, RateLimitSpec>,
    #[serde(default)]
    pub address_allow_list: Vec<String>,
    #[serde(default)]
    pub address_deny_list: Vec<String>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
    #[serde(default)]
    pub bearer: Option<BearerConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            providers: vec![ProviderKind::ApiKey, ProviderKind::BearerToken],
            require_secure_transport: false,
            global_rate_limit: None,
            per_identity_rate_limits: HashMap::new(),
            address_allow_list: Vec::new(),
            address_deny_list: Vec::new(),
            api_keys: Vec::new(),
            bearer: None,
        }
    }
}

/// The auth portion of an incoming call, as the transport hands it over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestAuth {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub source_address: String,
    #[serde(default)]
    pub secure_transport: bool,
}

impl RequestAuth {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.header("x-api-key")
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    }
}

/// Identity and rights attached to one in-flight call.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub roles: Vec<String>,
    /// Grants attached directly to the context (the synthetic wildcard for
    /// a disabled gate lives here).
    pub direct_permissions: Vec<Permission>,
    pub source_address: String,
    pub secure_transport: bool,
    pub authenticated: bool,
}

impl AuthContext {
    /// The context a disabled gate hands out: unauthenticated, all access.
    #[must_use]
    pub fn synthetic(source_address: impl Into<String>, secure_transport: bool) -> Self {
        Self {
            user_id: None,
            roles: Vec::new(),
            direct_permissions: vec![Permission::wildcard()],
            source_address: source_address.into(),
            secure_transport,
            authenticated: false,
        }
    }

    fn condition_context(&self) -> HashMap<String, String> {
        let mut ctx = HashMap::new();
        ctx.insert("source_address".to_string(), self.source_address.clone());
        ctx.insert(
            "secure_transport".to_string(),
            self.secure_transport.to_string(),
        );
        if let Some(user) = &self.user_id {
            ctx.insert("identity".to_string(), user.clone());
        }
        ctx
    }
}

/// Authentication, authorization, rate limiting, and the audit trail.
pub struct AuthGate {
    config: AuthConfig,
    roles: RwLock<RoleRegistry>,
    rate: RateGate,
    audit: AuditLog,
    introspector: Option<Arc<dyn TokenIntrospector>>,
}

impl AuthGate {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let rate = RateGate::new(config.global_rate_limit);
        for (identity, spec) in &config.per_identity_rate_limits {
            rate.set_identity_limit(identity, *spec);
        }
        for entry in &config.api_keys {
            if let Some(spec) = entry.rate_limit {
                rate.set_identity_limit(&entry.identity, spec);
            }
        }

        Self {
            config,
            roles: RwLock::new(RoleRegistry::new()),
            rate,
            audit: AuditLog::default(),
            introspector: None,
        }
    }

    #[must_use]
    pub fn with_introspector(mut self, introspector: Arc<dyn TokenIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    pub fn register_role(&self, role: Role) -> Result<(), ControlError> {
        self.roles.write().register(role)
    }

    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Resolve the caller's identity and apply the request-level policies.
    /// Failures short-circuit the pipeline with a structured error.
    pub async fn authenticate(&self, request: &RequestAuth) -> Result<AuthContext, ControlError> {
        // Back-pressure applies whether or not identities do.
        if !self.config.enabled {
            self.check_rate(None)?;
            return Ok(AuthContext::synthetic(
                request.source_address.clone(),
                request.secure_transport,
            ));
        }

        if !address::address_permitted(
            &self.config.address_allow_list,
            &self.config.address_deny_list,
            &request.source_address,
        ) {
            return Err(ControlError::AuthFailed {
                reason: format!("source address {} not permitted", request.source_address),
            });
        }

        if self.config.require_secure_transport && !request.secure_transport {
            return Err(ControlError::AuthFailed {
                reason: "secure transport required".to_string(),
            });
        }

        let mut rejection: Option<String> = None;
        let mut resolved: Option<ResolvedIdentity> = None;

        for provider in &self.config.providers {
            let outcome = match provider {
                ProviderKind::ApiKey => {
                    providers::resolve_api_key(&self.config.api_keys, request.api_key())
                }
                ProviderKind::BearerToken => {
                    providers::resolve_bearer(self.config.bearer.as_ref(), request.bearer_token())
                }
                ProviderKind::ExternalOauth => {
                    providers::resolve_oauth(self.introspector.as_ref(), request.bearer_token())
                        .await
                }
            };

            match outcome {
                Ok(identity) => {
                    resolved = Some(identity);
                    break;
                }
                Err(ProviderOutcome::NoCredential) => {}
                Err(ProviderOutcome::Rejected(reason)) => {
                    rejection.get_or_insert(reason);
                }
            }
        }

        let Some(identity) = resolved else {
            return Err(match rejection {
                Some(reason) => ControlError::AuthFailed { reason },
                None => ControlError::AuthRequired,
            });
        };

        if let Some(spec) = identity.rate_limit {
            self.rate.ensure_identity_limit(&identity.identity, spec);
        }
        self.check_rate(Some(&identity.identity))?;

        debug!(identity = %identity.identity, "request authenticated");
        Ok(AuthContext {
            user_id: Some(identity.identity),
            roles: identity.roles,
            direct_permissions: Vec::new(),
            source_address: request.source_address.clone(),
            secure_transport: request.secure_transport,
            authenticated: true,
        })
    }

    fn check_rate(&self, identity: Option<&str>) -> Result<(), ControlError> {
        self.rate.check(identity).map_err(|scope| {
            warn!(%scope, "request rate limited");
            ControlError::RateLimited {
                scope: scope.to_string(),
            }
        })
    }

    /// Permission check for a tool's declared `(resource, action)`. Every
    /// decision lands in the audit ring; denials are logged at warn.
    pub fn authorize(
        &self,
        context: &AuthContext,
        resource: &str,
        action: &str,
    ) -> Result<(), ControlError> {
        let conditions = context.condition_context();

        let allowed = context
            .direct_permissions
            .iter()
            .any(|p| p.allows(resource, action, &conditions))
            || self
                .roles
                .read()
                .check(&context.roles, resource, action, &conditions);

        self.audit.record(
            context.user_id.as_deref(),
            resource,
            action,
            allowed,
            (!allowed).then(|| "no matching permission".to_string()),
        );

        if allowed {
            Ok(())
        } else {
            warn!(
                identity = context.user_id.as_deref().unwrap_or("<anonymous>"),
                resource, action, "permission denied"
            );
            Err(ControlError::PermissionDenied {
                resource: resource.to_string(),
                action: action.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn request_with_key(key: &str) -> RequestAuth {
        RequestAuth {
            headers: HashMap::from([("X-Api-Key".to_string(), key.to_string())]),
            source_address: "127.0.0.1".to_string(),
            secure_transport: true,
        }
    }

    fn gate_with_key() -> AuthGate {
        let gate = AuthGate::new(AuthConfig {
            enabled: true,
            api_keys: vec![ApiKeyEntry {
                key: "sk-test-0001".to_string(),
                identity: "tester-id".to_string(),
                roles: vec!["tester".to_string()],
                rate_limit: None,
            }],
            ..AuthConfig::default()
        });
        gate.register_role(
            Role::new("tester")
                .permit(Permission::new("extraction", "get*"))
                .permit(Permission::new("extraction", "take*")),
        )
        .unwrap();
        gate
    }

    #[tokio::test]
    async fn disabled_gate_grants_wildcard_synthetic_context() {
        let gate = AuthGate::new(AuthConfig::default());
        let ctx = gate.authenticate(&RequestAuth::default()).await.unwrap();
        assert!(!ctx.authenticated);
        assert!(gate.authorize(&ctx, "anything", "at_all").is_ok());
        assert_eq!(gate.audit_log().denial_count(), 0);
    }

    #[tokio::test]
    async fn wildcard_role_permissions_cover_prefixes_only() {
        let gate = gate_with_key();
        let ctx = gate
            .authenticate(&request_with_key("sk-test-0001"))
            .await
            .unwrap();

        assert!(gate.authorize(&ctx, "extraction", "get_element_text").is_ok());
        assert!(gate.authorize(&ctx, "extraction", "take_screenshot").is_ok());
        let err = gate
            .authorize(&ctx, "extraction", "delete_anything")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(gate.audit_log().denial_count(), 1);
    }

    #[tokio::test]
    async fn missing_and_bad_credentials_map_to_distinct_codes() {
        let gate = gate_with_key();

        let missing = gate
            .authenticate(&RequestAuth {
                source_address: "127.0.0.1".to_string(),
                ..RequestAuth::default()
            })
            .await
            .unwrap_err();
        assert_eq!(missing.code(), ErrorCode::AuthRequired);

        let wrong = gate
            .authenticate(&request_with_key("sk-test-9999"))
            .await
            .unwrap_err();
        assert_eq!(wrong.code(), ErrorCode::AuthFailed);
        assert!(!wrong.to_string().contains("sk-test-9999-rest"));
    }

    #[tokio::test]
    async fn global_rate_limit_rejects_the_fourth_call() {
        let gate = AuthGate::new(AuthConfig {
            global_rate_limit: Some(RateLimitSpec {
                points: 3,
                window_seconds: 1,
            }),
            ..AuthConfig::default()
        });

        let request = RequestAuth::default();
        for _ in 0..3 {
            assert!(gate.authenticate(&request).await.is_ok());
        }
        let err = gate.authenticate(&request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn deny_list_is_evaluated_before_allow_list() {
        let gate = AuthGate::new(AuthConfig {
            enabled: true,
            address_allow_list: vec!["10.0.0.0/8".to_string()],
            address_deny_list: vec!["10.0.0.66".to_string()],
            api_keys: vec![ApiKeyEntry {
                key: "k".to_string(),
                identity: "i".to_string(),
                roles: vec![],
                rate_limit: None,
            }],
            ..AuthConfig::default()
        });

        let mut request = request_with_key("k");
        request.source_address = "10.0.0.66".to_string();
        assert_eq!(
            gate.authenticate(&request).await.unwrap_err().code(),
            ErrorCode::AuthFailed
        );

        request.source_address = "10.0.0.5".to_string();
        assert!(gate.authenticate(&request).await.is_ok());
    }
}
