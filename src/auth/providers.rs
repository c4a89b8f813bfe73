//! Authentication providers: api-key, bearer-token, and the external-oauth
//! seam. Providers are tried in the configured order; the first success
//! wins. Keys are only ever logged by prefix.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::rate_limit::RateLimitSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    ApiKey,
    BearerToken,
    ExternalOauth,
}

/// One configured API key binding. Deliberately not serializable: the key
/// material must never ride out on a wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    /// The opaque key material itself; never logged in full.
    pub key: String,
    pub identity: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
}

/// HS256 bearer-token policy. Like [`ApiKeyEntry`], never serialized.
#[derive(Debug, Clone, Deserialize)]
pub struct BearerConfig {
    /// Signing secret; never logged.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Maximum accepted distance between `iat` and `exp`.
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Deserialize)]
struct BearerClaims {
    sub: String,
    exp: u64,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    roles: Vec<String>,
}

/// The identity a provider resolved.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: String,
    pub roles: Vec<String>,
    pub rate_limit: Option<RateLimitSpec>,
}

/// Why a provider did not resolve an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// No credential of this provider's shape was present.
    NoCredential,
    /// A credential was present but invalid.
    Rejected(String),
}

/// First eight characters of a credential, for log lines.
#[must_use]
pub fn key_prefix(key: &str) -> String {
    key.chars().take(8).collect()
}

/// Validate a presented API key against the configured entries.
pub fn resolve_api_key(
    entries: &[ApiKeyEntry],
    presented: Option<&str>,
) -> Result<ResolvedIdentity, ProviderOutcome> {
    let Some(presented) = presented else {
        return Err(ProviderOutcome::NoCredential);
    };

    match entries.iter().find(|e| e.key == presented) {
        Some(entry) => {
            debug!(identity = %entry.identity, key_prefix = %key_prefix(presented), "api key accepted");
            Ok(ResolvedIdentity {
                identity: entry.identity.clone(),
                roles: entry.roles.clone(),
                rate_limit: entry.rate_limit,
            })
        }
        None => Err(ProviderOutcome::Rejected(format!(
            "unknown api key (prefix {})",
            key_prefix(presented)
        ))),
    }
}

/// Validate a bearer token: signature, issuer, audience, expiry, and the
/// configured lifetime policy.
pub fn resolve_bearer(
    config: Option<&BearerConfig>,
    token: Option<&str>,
) -> Result<ResolvedIdentity, ProviderOutcome> {
    let Some(token) = token else {
        return Err(ProviderOutcome::NoCredential);
    };
    let Some(config) = config else {
        return Err(ProviderOutcome::Rejected(
            "bearer tokens are not configured".to_string(),
        ));
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_audience(&[&config.audience]);

    let data = decode::<BearerClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|err| ProviderOutcome::Rejected(format!("bearer token invalid: {err}")))?;

    let claims = data.claims;
    if let Some(iat) = claims.iat {
        let lifetime = claims.exp.saturating_sub(iat);
        if lifetime > config.max_lifetime_secs {
            return Err(ProviderOutcome::Rejected(format!(
                "token lifetime {lifetime}s exceeds policy {}s",
                config.max_lifetime_secs
            )));
        }
    }

    Ok(ResolvedIdentity {
        identity: claims.sub,
        roles: claims.roles,
        rate_limit: None,
    })
}

/// Seam for an external OAuth introspection service. The gate treats the
/// provider as configured only when an introspector has been installed.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    async fn introspect(&self, token: &str) -> anyhow::Result<ResolvedIdentity>;
}

pub async fn resolve_oauth(
    introspector: Option<&Arc<dyn TokenIntrospector>>,
    token: Option<&str>,
) -> Result<ResolvedIdentity, ProviderOutcome> {
    let Some(token) = token else {
        return Err(ProviderOutcome::NoCredential);
    };
    let Some(introspector) = introspector else {
        return Err(ProviderOutcome::Rejected(
            "external-oauth provider is not configured".to_string(),
        ));
    };
    introspector
        .introspect(token)
        .await
        .map_err(|err| ProviderOutcome::Rejected(format!("introspection failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        iss: String,
        aud: String,
        exp: u64,
        iat: u64,
        roles: Vec<String>,
    }

    fn bearer_config() -> BearerConfig {
        BearerConfig {
            secret: "unit-test-secret".to_string(),
            issuer: "browser-control".to_string(),
            audience: "tools".to_string(),
            max_lifetime_secs: 3600,
        }
    }

    fn sign(claims: &TestClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn api_key_resolution_by_exact_match() {
        let entries = vec![ApiKeyEntry {
            key: "sk-live-abcdef".to_string(),
            identity: "ci".to_string(),
            roles: vec!["tester".to_string()],
            rate_limit: None,
        }];

        let ok = resolve_api_key(&entries, Some("sk-live-abcdef")).unwrap();
        assert_eq!(ok.identity, "ci");

        assert!(matches!(
            resolve_api_key(&entries, Some("sk-live-wrong")),
            Err(ProviderOutcome::Rejected(_))
        ));
        assert_eq!(
            resolve_api_key(&entries, None).unwrap_err(),
            ProviderOutcome::NoCredential
        );
    }

    #[test]
    fn rejection_reason_redacts_to_prefix() {
        let err = resolve_api_key(&[], Some("sk-live-very-secret-material")).unwrap_err();
        let ProviderOutcome::Rejected(reason) = err else {
            panic!("expected rejection")
        };
        assert!(reason.contains("sk-live-"));
        assert!(!reason.contains("very-secret-material"));
    }

    #[test]
    fn bearer_round_trip_and_lifetime_policy() {
        let config = bearer_config();
        let issued = now();

        let good = sign(
            &TestClaims {
                sub: "alice".to_string(),
                iss: config.issuer.clone(),
                aud: config.audience.clone(),
                exp: issued + 600,
                iat: issued,
                roles: vec!["tester".to_string()],
            },
            &config.secret,
        );
        let resolved = resolve_bearer(Some(&config), Some(&good)).unwrap();
        assert_eq!(resolved.identity, "alice");
        assert_eq!(resolved.roles, vec!["tester".to_string()]);

        let too_long = sign(
            &TestClaims {
                sub: "alice".to_string(),
                iss: config.issuer.clone(),
                aud: config.audience.clone(),
                exp: issued + 86_400,
                iat: issued,
                roles: vec![],
            },
            &config.secret,
        );
        assert!(matches!(
            resolve_bearer(Some(&config), Some(&too_long)),
            Err(ProviderOutcome::Rejected(_))
        ));

        let wrong_secret = sign(
            &TestClaims {
                sub: "alice".to_string(),
                iss: config.issuer.clone(),
                aud: config.audience.clone(),
                exp: issued + 600,
                iat: issued,
                roles: vec![],
            },
            "other-secret",
        );
        assert!(matches!(
            resolve_bearer(Some(&config), Some(&wrong_secret)),
            Err(ProviderOutcome::Rejected(_))
        ));
    }
}
