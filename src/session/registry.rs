//! Externally named sessions with a strict concurrent cap.
//!
//! The registry is the user-facing quota: callers hit `SESSION_LIMIT` here
//! long before the pool's internal reuse bound matters. Entries hold
//! non-owning references to pool records; destroying a session returns the
//! record to the pool, which owns the actual teardown.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::{BrowserKind, DriverOptions};
use crate::error::ControlError;
use crate::session::pool::{PoolError, SessionPool, SharedRecord};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("concurrent session limit of {limit} reached")]
    LimitReached { limit: usize },

    #[error("session `{0}` not found")]
    NotFound(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl From<RegistryError> for ControlError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::LimitReached { limit } => ControlError::SessionLimit { limit },
            RegistryError::NotFound(id) => ControlError::SessionNotFound { id },
            RegistryError::Pool(inner) => inner.into(),
        }
    }
}

struct RegistryEntry {
    record: SharedRecord,
    kind: BrowserKind,
    /// Create-time options, preserved so identity survives any internal
    /// record replacement.
    options: DriverOptions,
    created: Instant,
    created_wall: DateTime<Utc>,
    /// Insertion order; `pick_default` returns the lowest live sequence.
    seq: u64,
}

struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    /// Creations in flight, counted against the cap so a burst of
    /// concurrent `create_session` calls cannot overshoot it.
    pending: usize,
}

/// Snapshot row for `list_sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub browser_kind: BrowserKind,
    pub created_at: DateTime<Utc>,
    pub age_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_actions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_errors: Option<u32>,
}

/// Snapshot of registry-level counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryMetrics {
    /// Sessions created over the life of the process.
    pub total_sessions: u64,
    /// Currently named sessions.
    pub active_sessions: usize,
    pub average_session_age_ms: u64,
    /// Sessions destroyed because their error streak crossed the threshold.
    pub failed_sessions: u64,
}

/// Name → session map enforcing the user-facing concurrency cap.
pub struct SessionRegistry {
    pool: Arc<SessionPool>,
    state: Mutex<RegistryState>,
    max_concurrent: usize,
    next_seq: AtomicU64,
    total_created: AtomicU64,
    failed_sessions: AtomicU64,
}

impl SessionRegistry {
    pub fn new(pool: Arc<SessionPool>, max_concurrent: usize) -> Self {
        Self {
            pool,
            state: Mutex::new(RegistryState {
                entries: HashMap::new(),
                pending: 0,
            }),
            max_concurrent,
            next_seq: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            failed_sessions: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn cap(&self) -> usize {
        self.max_concurrent
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Mint a new externally named session backed by a pool record. The
    /// session id is the record's id, stable for the life of the binding.
    pub async fn create_session(
        &self,
        kind: Option<BrowserKind>,
        options: Option<DriverOptions>,
    ) -> Result<String, RegistryError> {
        {
            let mut state = self.state.lock();
            if state.entries.len() + state.pending >= self.max_concurrent {
                return Err(RegistryError::LimitReached {
                    limit: self.max_concurrent,
                });
            }
            state.pending += 1;
        }

        let pool_config = self.pool.config_snapshot();
        let kind = kind.unwrap_or(pool_config.default_kind);
        let options = options.unwrap_or(pool_config.default_options);

        let borrowed = self.pool.borrow_matching(kind, &options).await;

        let mut state = self.state.lock();
        state.pending -= 1;
        match borrowed {
            Ok(record) => {
                let id = match record.try_lock() {
                    Ok(guard) => guard.id().to_string(),
                    Err(_) => {
                        // Freshly borrowed records are unlocked; treat this
                        // as a programmer error surfaced gracefully.
                        warn!("borrowed record unexpectedly locked");
                        return Err(RegistryError::Pool(PoolError::Closed));
                    }
                };
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                state.entries.insert(
                    id.clone(),
                    RegistryEntry {
                        record,
                        kind,
                        options,
                        created: Instant::now(),
                        created_wall: Utc::now(),
                        seq,
                    },
                );
                self.total_created.fetch_add(1, Ordering::Relaxed);
                info!(session = %id, %kind, "session created");
                Ok(id)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn get(&self, id: &str) -> Result<SharedRecord, RegistryError> {
        self.state
            .lock()
            .entries
            .get(id)
            .map(|e| Arc::clone(&e.record))
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Create-time options for a session, as recorded at `create_session`.
    pub fn creation_options(&self, id: &str) -> Option<(BrowserKind, DriverOptions)> {
        self.state
            .lock()
            .entries
            .get(id)
            .map(|e| (e.kind, e.options.clone()))
    }

    /// Unbind a session and hand its record back to the pool. Idempotent:
    /// destroying an unknown id is a no-op.
    pub async fn destroy_session(&self, id: &str) -> bool {
        let existed = self.state.lock().entries.remove(id).is_some();
        if existed {
            self.pool.release(id, false).await;
            info!(session = %id, "session destroyed");
        } else {
            debug!(session = %id, "destroy for unknown session (no-op)");
        }
        existed
    }

    /// Unbind a session whose record is no longer trustworthy. The record
    /// is marked unusable so the pool retires it at return instead of
    /// recycling it.
    pub async fn destroy_failed_session(&self, id: &str) -> bool {
        let entry = self.state.lock().entries.remove(id);
        let Some(entry) = entry else { return false };

        self.failed_sessions.fetch_add(1, Ordering::Relaxed);
        entry.record.lock().await.set_ready(false);
        self.pool.release(id, true).await;
        warn!(session = %id, "session destroyed after repeated errors");
        true
    }

    /// Snapshot of live sessions in insertion order. Never blocks pool
    /// operations; per-record counters are filled in opportunistically.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let state = self.state.lock();
        let mut rows: Vec<(u64, SessionSummary)> = state
            .entries
            .iter()
            .map(|(id, entry)| {
                let (total_actions, consecutive_errors) = match entry.record.try_lock() {
                    Ok(guard) => (
                        Some(guard.perf().total_actions),
                        Some(guard.consecutive_errors()),
                    ),
                    Err(_) => (None, None),
                };
                (
                    entry.seq,
                    SessionSummary {
                        id: id.clone(),
                        browser_kind: entry.kind,
                        created_at: entry.created_wall,
                        age_ms: entry.created.elapsed().as_millis() as u64,
                        total_actions,
                        consecutive_errors,
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row).collect()
    }

    /// The session a caller gets when they omit an id: the first listed,
    /// i.e. the oldest binding still alive. Callers that care which browser
    /// they drive should pass an explicit id.
    #[must_use]
    pub fn pick_default(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .min_by_key(|(_, e)| e.seq)
            .map(|(id, _)| id.clone())
    }

    /// Append one action to the session's ring buffer and counters. Returns
    /// `true` when the action pushed the record over its error threshold
    /// and the session was destroyed as a result.
    pub async fn track_action(
        &self,
        id: &str,
        action: &str,
        selector: Option<String>,
        success: bool,
        duration_ms: u64,
    ) -> Result<bool, RegistryError> {
        let record = self.get(id)?;
        let over_threshold = {
            let mut guard = record.lock().await;
            guard.note_action(action, selector, success, duration_ms);
            guard.consecutive_errors() > self.pool.config_snapshot().max_consecutive_errors
        };

        if over_threshold {
            self.destroy_failed_session(id).await;
            return Ok(true);
        }
        Ok(false)
    }

    #[must_use]
    pub fn metrics(&self) -> RegistryMetrics {
        let state = self.state.lock();
        let active = state.entries.len();
        let avg_age_ms = if active == 0 {
            0
        } else {
            state
                .entries
                .values()
                .map(|e| e.created.elapsed().as_millis() as u64)
                .sum::<u64>()
                / active as u64
        };
        RegistryMetrics {
            total_sessions: self.total_created.load(Ordering::Relaxed),
            active_sessions: active,
            average_session_age_ms: avg_age_ms,
            failed_sessions: self.failed_sessions.load(Ordering::Relaxed),
        }
    }

    /// Destroy every entry. Used by the shutdown coordinator.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        for id in ids {
            self.destroy_session(&id).await;
        }
        info!("session registry drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::stub::StubDriverFactory;
    use crate::session::pool::PoolConfig;
    use std::time::Duration;

    fn registry(max_concurrent: usize) -> (Arc<SessionPool>, SessionRegistry) {
        let factory = Arc::new(StubDriverFactory::new());
        let pool = SessionPool::new(
            PoolConfig {
                min_size: 0,
                max_size: 8,
                prewarm_count: 0,
                borrow_deadline: Duration::from_millis(200),
                ..PoolConfig::default()
            },
            factory,
        );
        let registry = SessionRegistry::new(Arc::clone(&pool), max_concurrent);
        (pool, registry)
    }

    #[tokio::test]
    async fn cap_is_enforced_before_the_pool_is_touched() {
        let (_pool, registry) = registry(2);
        registry.create_session(None, None).await.unwrap();
        registry.create_session(None, None).await.unwrap();

        let err = registry.create_session(None, None).await.unwrap_err();
        assert!(matches!(err, RegistryError::LimitReached { limit: 2 }));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_frees_the_cap() {
        let (_pool, registry) = registry(1);
        let id = registry.create_session(None, None).await.unwrap();

        assert!(registry.destroy_session(&id).await);
        assert!(!registry.destroy_session(&id).await);
        assert!(registry.create_session(None, None).await.is_ok());
    }

    #[tokio::test]
    async fn pick_default_is_insertion_order() {
        let (_pool, registry) = registry(3);
        let first = registry.create_session(None, None).await.unwrap();
        let _second = registry.create_session(None, None).await.unwrap();

        assert_eq!(registry.pick_default(), Some(first.clone()));

        registry.destroy_session(&first).await;
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(registry.pick_default(), Some(listed[0].id.clone()));
    }

    #[tokio::test]
    async fn error_streak_destroys_the_session_and_counts_it_failed() {
        let (pool, registry) = registry(2);
        let id = registry.create_session(None, None).await.unwrap();

        let mut retired = false;
        for _ in 0..6 {
            retired = registry
                .track_action(&id, "click", Some("#x".into()), false, 5)
                .await
                .unwrap();
        }
        assert!(retired, "sixth failure must retire the session");
        assert!(matches!(
            registry.get(&id),
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(registry.metrics().failed_sessions, 1);

        // The pool replaces the retired record to honor its minimum.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.counts().in_use == 0);
    }
}
