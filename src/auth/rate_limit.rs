//! Token-bucket rate limiting with the governor crate.
//!
//! One optional global limiter plus lazily created per-identity limiters.
//! Rejections happen before any session work is scheduled, which makes the
//! gate the cheap half of the back-pressure story (pool capacity being the
//! expensive half).

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// `points` requests allowed per `window_seconds`, burstable to `points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    pub points: u32,
    pub window_seconds: u64,
}

impl RateLimitSpec {
    fn quota(self) -> Option<Quota> {
        let points = NonZeroU32::new(self.points)?;
        let window = Duration::from_secs(self.window_seconds.max(1));
        Some(Quota::with_period(window / self.points.max(1))?.allow_burst(points))
    }
}

/// Scope that rejected a request, for the error message and the audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateScope {
    Global,
    Identity(String),
}

impl std::fmt::Display for RateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Identity(id) => write!(f, "identity {id}"),
        }
    }
}

/// Global + per-identity buckets.
pub struct RateGate {
    global: Option<Limiter>,
    /// Lazily created, one bucket per identity that has a spec.
    identity_buckets: DashMap<String, Arc<Limiter>>,
    identity_specs: DashMap<String, RateLimitSpec>,
}

impl RateGate {
    #[must_use]
    pub fn new(global: Option<RateLimitSpec>) -> Self {
        Self {
            global: global.and_then(|spec| spec.quota()).map(RateLimiter::direct),
            identity_buckets: DashMap::new(),
            identity_specs: DashMap::new(),
        }
    }

    /// Attach (or replace) a per-identity limit. Replacing a limit resets
    /// its bucket.
    pub fn set_identity_limit(&self, identity: impl Into<String>, spec: RateLimitSpec) {
        let identity = identity.into();
        self.identity_buckets.remove(&identity);
        self.identity_specs.insert(identity, spec);
    }

    /// Attach a per-identity limit unless the same spec is already in
    /// place, so repeated requests never reset a live bucket.
    pub fn ensure_identity_limit(&self, identity: &str, spec: RateLimitSpec) {
        let unchanged = self.identity_specs.get(identity).map(|s| *s) == Some(spec);
        if !unchanged {
            self.set_identity_limit(identity, spec);
        }
    }

    /// Consume one point from the global bucket and, when the identity has
    /// a spec, from its bucket. First exhausted scope wins.
    pub fn check(&self, identity: Option<&str>) -> Result<(), RateScope> {
        if let Some(global) = &self.global {
            if global.check().is_err() {
                return Err(RateScope::Global);
            }
        }

        if let Some(identity) = identity {
            if let Some(spec) = self.identity_specs.get(identity).map(|s| *s) {
                let bucket = self
                    .identity_buckets
                    .entry(identity.to_string())
                    .or_insert_with(|| {
                        let quota = spec
                            .quota()
                            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
                        Arc::new(RateLimiter::direct(quota))
                    })
                    .clone();
                if bucket.check().is_err() {
                    return Err(RateScope::Identity(identity.to_string()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_bucket_allows_points_then_rejects() {
        let gate = RateGate::new(Some(RateLimitSpec {
            points: 3,
            window_seconds: 1,
        }));

        assert!(gate.check(None).is_ok());
        assert!(gate.check(None).is_ok());
        assert!(gate.check(None).is_ok());
        assert_eq!(gate.check(None), Err(RateScope::Global));
    }

    #[test]
    fn ensure_does_not_reset_a_live_bucket() {
        let gate = RateGate::new(None);
        let spec = RateLimitSpec {
            points: 1,
            window_seconds: 60,
        };

        gate.ensure_identity_limit("alice", spec);
        assert!(gate.check(Some("alice")).is_ok());

        // Re-ensuring the same spec must not hand back a fresh bucket.
        gate.ensure_identity_limit("alice", spec);
        assert_eq!(
            gate.check(Some("alice")),
            Err(RateScope::Identity("alice".to_string()))
        );
    }

    #[test]
    fn identity_buckets_are_independent() {
        let gate = RateGate::new(None);
        gate.set_identity_limit(
            "alice",
            RateLimitSpec {
                points: 1,
                window_seconds: 60,
            },
        );

        assert!(gate.check(Some("alice")).is_ok());
        assert_eq!(
            gate.check(Some("alice")),
            Err(RateScope::Identity("alice".to_string()))
        );
        // No spec for bob, so no bucket applies.
        assert!(gate.check(Some("bob")).is_ok());
        assert!(gate.check(Some("bob")).is_ok());
    }
}
