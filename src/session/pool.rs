//! Bounded session pool with borrow/return semantics.
//!
//! The pool owns every [`SessionRecord`] for the life of the process. It
//! amortizes driver startup cost by reusing warm records (most recently
//! used first), retires records whose age, use count, or error streak has
//! degraded, and keeps itself between its configured bounds with a
//! background health loop.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{BrowserKind, DriverError, DriverFactory, DriverOptions};
use crate::error::ControlError;
use crate::session::record::SessionRecord;

/// A pool-owned record. Exclusive access while borrowed comes from the
/// record never appearing in the available set and from the async mutex
/// serializing stragglers.
pub type SharedRecord = Arc<AsyncMutex<SessionRecord>>;

/// Bounds and policies for the pool. Frozen at construction except through
/// [`SessionPool::resize`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Lower bound the pool keeps itself topped up to while healthy.
    pub min_size: usize,
    /// Hard upper bound on live records, counting in-flight creations.
    pub max_size: usize,
    /// Idle records beyond `min_size` older than this are destroyed.
    pub idle_timeout: Duration,
    /// Records older than this are retired at return time.
    pub max_session_age: Duration,
    /// Cadence of the background health loop.
    pub health_check_interval: Duration,
    /// Target size for [`SessionPool::prewarm`].
    pub prewarm_count: usize,
    /// How long a borrow waits for a return before failing.
    pub borrow_deadline: Duration,
    /// Error streak beyond which a record is retired at return.
    pub max_consecutive_errors: u32,
    /// Lifetime use count beyond which a record is retired at return.
    pub max_use_count: u64,
    /// Kind used when the borrower does not request one.
    pub default_kind: BrowserKind,
    /// Options used when the borrower does not supply any.
    pub default_options: DriverOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 8,
            idle_timeout: Duration::from_secs(300),
            max_session_age: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(30),
            prewarm_count: 2,
            borrow_deadline: Duration::from_secs(30),
            max_consecutive_errors: 5,
            max_use_count: 1000,
            default_kind: BrowserKind::Chromium,
            default_options: DriverOptions::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("session pool is shut down")]
    Closed,

    #[error("no session became available within {waited_ms} ms")]
    Exhausted { waited_ms: u64 },

    #[error(transparent)]
    CreationFailed(#[from] DriverError),
}

impl From<PoolError> for ControlError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Closed => ControlError::PoolClosed,
            PoolError::Exhausted { waited_ms } => ControlError::PoolExhausted { waited_ms },
            PoolError::CreationFailed(inner) => inner.into(),
        }
    }
}

/// Cheap snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PoolCounts {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
    pub pending_creates: usize,
}

/// Metadata mirrored out of a record while it sits in the available set.
/// Records in the set have no other holder, so the mirror cannot go stale.
struct AvailableEntry {
    id: String,
    kind: BrowserKind,
    last_used: Instant,
    created: Instant,
    last_health_check: Instant,
}

struct PoolState {
    all: HashMap<String, SharedRecord>,
    available: Vec<AvailableEntry>,
    pending_creates: usize,
    closed: bool,
}

impl PoolState {
    fn total(&self) -> usize {
        self.all.len() + self.pending_creates
    }
}

/// The bounded multiset of session records.
pub struct SessionPool {
    config: RwLock<PoolConfig>,
    factory: Arc<dyn DriverFactory>,
    state: Mutex<PoolState>,
    returned: Notify,
    health_handle: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl SessionPool {
    pub fn new(config: PoolConfig, factory: Arc<dyn DriverFactory>) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config),
            factory,
            state: Mutex::new(PoolState {
                all: HashMap::new(),
                available: Vec::new(),
                pending_creates: 0,
                closed: false,
            }),
            returned: Notify::new(),
            health_handle: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Prewarm to the configured target and start the health loop.
    pub async fn start(self: &Arc<Self>) {
        self.prewarm().await;

        let weak = Arc::downgrade(self);
        let interval = self.config.read().health_check_interval;
        let handle = tokio::spawn(health_loop(weak, interval));
        *self.health_handle.lock() = Some(handle);

        info!(counts = ?self.counts(), "session pool started");
    }

    #[must_use]
    pub fn counts(&self) -> PoolCounts {
        let state = self.state.lock();
        PoolCounts {
            total: state.total(),
            available: state.available.len(),
            in_use: state.all.len() - state.available.len(),
            pending_creates: state.pending_creates,
        }
    }

    #[must_use]
    pub fn config_snapshot(&self) -> PoolConfig {
        self.config.read().clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Borrow a record of the pool's default kind.
    pub async fn borrow(self: &Arc<Self>) -> Result<SharedRecord, PoolError> {
        let (kind, options) = {
            let config = self.config.read();
            (config.default_kind, config.default_options.clone())
        };
        self.borrow_matching(kind, &options).await
    }

    /// Borrow a record of the requested kind, reusing a warm one when the
    /// kinds match and growing the pool otherwise.
    ///
    /// Resolution order: warmest matching available record, then growth
    /// under `max_size`, then a bounded wait for a return.
    pub async fn borrow_matching(
        self: &Arc<Self>,
        kind: BrowserKind,
        options: &DriverOptions,
    ) -> Result<SharedRecord, PoolError> {
        let deadline = self.config.read().borrow_deadline;
        let started = Instant::now();

        loop {
            enum Plan {
                Reuse(SharedRecord, AvailableEntry),
                Grow,
                Wait,
            }

            let plan = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }

                // Warm-cache bias: most recently used matching record wins.
                let pick = state
                    .available
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.kind == kind)
                    .max_by_key(|(_, e)| e.last_used)
                    .map(|(i, _)| i);

                if let Some(idx) = pick {
                    let entry = state.available.remove(idx);
                    match state.all.get(&entry.id) {
                        Some(record) => Plan::Reuse(Arc::clone(record), entry),
                        None => continue,
                    }
                } else if state.total() < self.config.read().max_size {
                    state.pending_creates += 1;
                    Plan::Grow
                } else {
                    Plan::Wait
                }
            };

            match plan {
                Plan::Reuse(record, entry) => {
                    // Nothing else can hold an available record's lock.
                    let mut borrowed = false;
                    if let Ok(mut guard) = record.try_lock() {
                        guard.mark_borrowed();
                        debug!(id = %guard.id(), "borrowed warm session");
                        borrowed = true;
                    }
                    if borrowed {
                        return Ok(record);
                    }
                    warn!(id = %entry.id, "available record was locked; reinstating it");
                    self.state.lock().available.push(entry);
                    continue;
                }
                Plan::Grow => {
                    return self.create_borrowed(kind, options).await;
                }
                Plan::Wait => {
                    let elapsed = started.elapsed();
                    let Some(remaining) = deadline.checked_sub(elapsed) else {
                        return Err(PoolError::Exhausted {
                            waited_ms: elapsed.as_millis() as u64,
                        });
                    };
                    if tokio::time::timeout(remaining, self.returned.notified())
                        .await
                        .is_err()
                    {
                        return Err(PoolError::Exhausted {
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    /// Create a record and hand it out already marked in-use. The pending
    /// slot was reserved by the caller under the state lock.
    async fn create_borrowed(
        &self,
        kind: BrowserKind,
        options: &DriverOptions,
    ) -> Result<SharedRecord, PoolError> {
        let created = self.factory.create(kind, options).await;

        enum Decision {
            Closed(SessionRecord),
            Created(SharedRecord),
            Failed(DriverError),
        }

        let decision = {
            let mut state = self.state.lock();
            state.pending_creates -= 1;

            match created {
                Ok(handle) => {
                    let mut record = SessionRecord::new(handle);
                    if state.closed {
                        Decision::Closed(record)
                    } else {
                        record.mark_borrowed();
                        let id = record.id().to_string();
                        let shared = Arc::new(AsyncMutex::new(record));
                        state.all.insert(id.clone(), Arc::clone(&shared));
                        debug!(%id, %kind, "grew pool with fresh session");
                        Decision::Created(shared)
                    }
                }
                Err(err) => Decision::Failed(err),
            }
        };

        match decision {
            Decision::Closed(record) => {
                self.factory.close(record.driver()).await;
                Err(PoolError::Closed)
            }
            Decision::Created(shared) => Ok(shared),
            Decision::Failed(err) => {
                // A waiter may now be able to take the freed slot.
                self.returned.notify_one();
                warn!(error = %err, %kind, "driver creation failed during borrow");
                Err(PoolError::CreationFailed(err))
            }
        }
    }

    /// Return a borrowed record. Applies the retirement rules; survivors go
    /// back to the available set, retirees are destroyed and replaced when
    /// the pool would otherwise fall under its minimum.
    pub async fn release(self: &Arc<Self>, id: &str, had_errors: bool) {
        let record = {
            let state = self.state.lock();
            if state.closed {
                return;
            }
            state.all.get(id).cloned()
        };
        let Some(record) = record else {
            debug!(%id, "release for unknown record (already retired)");
            return;
        };

        let (retire_reason, entry) = {
            let mut guard = record.lock().await;
            guard.mark_released(had_errors);
            let config = self.config.read();
            let reason = should_retire(&guard, &config);
            let entry = AvailableEntry {
                id: id.to_string(),
                kind: guard.browser_kind(),
                last_used: guard.last_used_at(),
                created: guard.created_at(),
                last_health_check: guard.last_health_check(),
            };
            (reason, entry)
        };

        match retire_reason {
            Some(reason) => {
                self.retire(id, reason).await;
                self.top_up_to_min();
            }
            None => {
                let mut state = self.state.lock();
                if state.closed
                    || !state.all.contains_key(id)
                    || state.available.iter().any(|e| e.id == id)
                {
                    return;
                }
                state.available.push(entry);
                drop(state);
                self.returned.notify_one();
            }
        }
    }

    /// Remove and destroy one record. Destruction failures are logged and
    /// suppressed.
    async fn retire(&self, id: &str, reason: &'static str) {
        let record = {
            let mut state = self.state.lock();
            state.available.retain(|e| e.id != id);
            state.all.remove(id)
        };
        let Some(record) = record else { return };

        info!(%id, reason, "retiring session");
        let guard = record.lock().await;
        self.factory.close(guard.driver()).await;
        drop(guard);
        // Capacity freed; a waiter can now grow the pool.
        self.returned.notify_one();
    }

    /// Best-effort background top-up to the configured minimum.
    fn top_up_to_min(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Some(pool) = weak.upgrade() {
                let min_size = pool.config.read().min_size;
                pool.fill_to(min_size).await;
            }
        });
    }

    /// Raise the pool up to `target` records, honoring `max_size`. Missing
    /// records are launched concurrently; individual launch failures are
    /// logged and the pool stays where it got to.
    async fn fill_to(self: &Arc<Self>, target: usize) {
        let to_launch = {
            let mut state = self.state.lock();
            let max = self.config.read().max_size;
            let target = target.min(max);
            if state.closed || state.total() >= target {
                return;
            }
            let n = target - state.total();
            state.pending_creates += n;
            n
        };

        let (kind, options) = {
            let config = self.config.read();
            (config.default_kind, config.default_options.clone())
        };
        let launches = (0..to_launch).map(|_| self.factory.create(kind, &options));
        let results = futures::future::join_all(launches).await;

        let mut orphaned = Vec::new();
        {
            let mut state = self.state.lock();
            state.pending_creates -= to_launch;
            for result in results {
                match result {
                    Ok(handle) => {
                        if state.closed {
                            orphaned.push(handle);
                            continue;
                        }
                        let record = SessionRecord::new(handle);
                        let id = record.id().to_string();
                        state.available.push(AvailableEntry {
                            id: id.clone(),
                            kind: record.browser_kind(),
                            last_used: record.last_used_at(),
                            created: record.created_at(),
                            last_health_check: record.last_health_check(),
                        });
                        state.all.insert(id, Arc::new(AsyncMutex::new(record)));
                    }
                    Err(err) => {
                        warn!(error = %err, "pool top-up launch failed");
                    }
                }
            }
        }

        for handle in &orphaned {
            self.factory.close(handle).await;
        }
        self.returned.notify_waiters();
    }

    /// Raise the pool to the configured prewarm target.
    pub async fn prewarm(self: &Arc<Self>) {
        let target = {
            let config = self.config.read();
            config.prewarm_count.max(config.min_size)
        };
        self.fill_to(target).await;
    }

    /// Probe every not-in-use record and destroy the ones that fail,
    /// regardless of their error budget.
    pub async fn force_cleanup(self: &Arc<Self>) {
        let candidates = self.take_available();
        for entry in candidates {
            self.probe_and_reinstate(entry, true).await;
        }
        self.top_up_to_min();
    }

    /// Update bounds: destroy surplus idle records above the new max and
    /// top up toward the new min.
    pub async fn resize(self: &Arc<Self>, new_min: usize, new_max: usize) {
        {
            let mut config = self.config.write();
            config.min_size = new_min;
            config.max_size = new_max.max(new_min);
        }

        // Excess idle records go first, oldest created first.
        loop {
            let surplus = {
                let mut state = self.state.lock();
                if state.closed || state.total() <= new_max || state.available.is_empty() {
                    None
                } else {
                    state
                        .available
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, e)| e.created)
                        .map(|(i, _)| i)
                        .map(|i| state.available.remove(i))
                }
            };
            match surplus {
                Some(entry) => self.retire(&entry.id, "resized below capacity").await,
                None => break,
            }
        }

        self.fill_to(new_min).await;
        info!(new_min, new_max, counts = ?self.counts(), "pool resized");
    }

    /// Stop health checking and destroy every record, including records
    /// currently in use. Subsequent operations fail with `PoolClosed`.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        if let Some(handle) = self.health_handle.lock().take() {
            handle.abort();
        }

        let records: Vec<(String, SharedRecord)> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.available.clear();
            state.all.drain().collect()
        };
        // Wake every waiter so pending borrows fail fast.
        self.returned.notify_waiters();

        for (id, record) in records {
            let mut closed_now = false;
            if let Ok(guard) = record.try_lock() {
                self.factory.close(guard.driver()).await;
                closed_now = true;
            }
            if !closed_now {
                // A handler still holds the record; close it as soon as
                // the holder lets go.
                let factory = Arc::clone(&self.factory);
                tokio::spawn(async move {
                    let guard = record.lock().await;
                    factory.close(guard.driver()).await;
                    debug!(id = %guard.id(), "late-closed in-use session at shutdown");
                });
                debug!(%id, "deferred close of in-use session");
            }
        }

        info!("session pool shut down");
    }

    /// Drain the available set for probing.
    fn take_available(&self) -> Vec<AvailableEntry> {
        let mut state = self.state.lock();
        std::mem::take(&mut state.available)
    }

    /// Probe one candidate; healthy records rejoin the available set.
    /// Failures count against the error budget and retire past threshold,
    /// or immediately when `destroy_on_failure` is set.
    async fn probe_and_reinstate(self: &Arc<Self>, entry: AvailableEntry, destroy_on_failure: bool) {
        let record = {
            let state = self.state.lock();
            state.all.get(&entry.id).cloned()
        };
        let Some(record) = record else { return };

        let healthy = {
            let mut guard = match record.try_lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            let report = self.factory.probe(guard.driver()).await;
            guard.note_health_check();
            if !report.healthy {
                guard.bump_errors();
            }
            let config = self.config.read();
            report.healthy
                || (!destroy_on_failure
                    && guard.consecutive_errors() <= config.max_consecutive_errors)
        };

        if healthy {
            let mut state = self.state.lock();
            if state.closed || !state.all.contains_key(&entry.id) {
                return;
            }
            let last_health_check = Instant::now();
            state.available.push(AvailableEntry {
                last_health_check,
                ..entry
            });
            drop(state);
            self.returned.notify_one();
        } else {
            self.retire(&entry.id, "failed health probe").await;
        }
    }

    /// One pass of the periodic health loop.
    async fn health_tick(self: &Arc<Self>) {
        let interval = self.config.read().health_check_interval;

        // Probe idle records whose last check went stale.
        let (stale, fresh): (Vec<_>, Vec<_>) = self
            .take_available()
            .into_iter()
            .partition(|e| e.last_health_check.elapsed() >= interval);

        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.available.extend(fresh);
        }

        for entry in stale {
            self.probe_and_reinstate(entry, false).await;
        }

        // Destroy idle-but-excess records over the minimum, oldest first.
        let (min_size, idle_timeout) = {
            let config = self.config.read();
            (config.min_size, config.idle_timeout)
        };
        loop {
            let victim = {
                let mut state = self.state.lock();
                if state.closed || state.total() <= min_size {
                    None
                } else {
                    state
                        .available
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| e.last_used.elapsed() > idle_timeout)
                        .min_by_key(|(_, e)| e.created)
                        .map(|(i, _)| i)
                        .map(|i| state.available.remove(i))
                }
            };
            match victim {
                Some(entry) => self.retire(&entry.id, "idle past timeout").await,
                None => break,
            }
        }

        // Top back up to the floor.
        self.fill_to(min_size).await;
    }
}

/// Retirement rules, applied at return time only. A record is never retired
/// while in use.
fn should_retire(record: &SessionRecord, config: &PoolConfig) -> Option<&'static str> {
    if !record.ready() {
        Some("marked unusable")
    } else if record.age() > config.max_session_age {
        Some("exceeded max session age")
    } else if record.consecutive_errors() > config.max_consecutive_errors {
        Some("chronic errors")
    } else if record.use_count() > config.max_use_count {
        Some("worn out")
    } else {
        None
    }
}

async fn health_loop(pool: Weak<SessionPool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a freshly prewarmed pool
    // is not re-probed at startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else { break };
        if pool.is_closed() {
            break;
        }
        pool.health_tick().await;
    }

    debug!("pool health loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::stub::StubDriverFactory;

    fn quick_config() -> PoolConfig {
        PoolConfig {
            min_size: 1,
            max_size: 2,
            prewarm_count: 1,
            borrow_deadline: Duration::from_millis(200),
            health_check_interval: Duration::from_secs(60),
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn borrow_reuses_then_grows_then_times_out() {
        let factory = Arc::new(StubDriverFactory::new());
        let pool = SessionPool::new(quick_config(), factory.clone());
        pool.start().await;
        assert_eq!(pool.counts().available, 1);

        let first = pool.borrow().await.unwrap();
        assert_eq!(pool.counts().in_use, 1);

        let second = pool.borrow().await.unwrap();
        assert_eq!(pool.counts().total, 2);
        assert_eq!(factory.created_count(), 2);

        let started = Instant::now();
        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { .. }));
        assert!(started.elapsed() >= Duration::from_millis(200));

        let first_id = first.lock().await.id().to_string();
        let second_id = second.lock().await.id().to_string();
        pool.release(&first_id, false).await;
        pool.release(&second_id, false).await;
        assert_eq!(pool.counts().available, 2);
    }

    #[tokio::test]
    async fn waiting_borrow_is_woken_by_a_release() {
        let factory = Arc::new(StubDriverFactory::new());
        let mut config = quick_config();
        config.max_size = 1;
        config.borrow_deadline = Duration::from_secs(5);
        let pool = SessionPool::new(config, factory);
        pool.start().await;

        let held = pool.borrow().await.unwrap();
        let held_id = held.lock().await.id().to_string();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.borrow().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release(&held_id, false).await;

        let reborrowed = waiter.await.unwrap().unwrap();
        assert_eq!(reborrowed.lock().await.id(), held_id);
    }

    #[tokio::test]
    async fn error_streak_retires_at_release_and_replacement_restores_min() {
        let factory = Arc::new(StubDriverFactory::new());
        let pool = SessionPool::new(quick_config(), factory.clone());
        pool.start().await;

        let record = pool.borrow().await.unwrap();
        let id = {
            let mut guard = record.lock().await;
            for _ in 0..6 {
                guard.note_action("click", Some("#x".into()), false, 5);
            }
            guard.id().to_string()
        };
        drop(record);

        pool.release(&id, false).await;
        // Replacement spawn is async; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state_has_old = pool.state.lock().all.contains_key(&id);
        assert!(!state_has_old, "chronically failing record must be gone");
        assert!(pool.counts().total >= 1, "minimum must be restored");
        assert!(factory.closed_count() >= 1);
    }

    #[tokio::test]
    async fn shutdown_fails_waiters_and_new_borrows() {
        let factory = Arc::new(StubDriverFactory::new());
        let mut config = quick_config();
        config.max_size = 1;
        config.borrow_deadline = Duration::from_secs(30);
        let pool = SessionPool::new(config, factory);
        pool.start().await;

        let _held = pool.borrow().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.borrow().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.shutdown().await;
        assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed)));
        assert!(matches!(pool.borrow().await, Err(PoolError::Closed)));
        assert_eq!(pool.counts().total, 0);
    }

    #[tokio::test]
    async fn resize_trims_idle_surplus_and_respects_new_bounds() {
        let factory = Arc::new(StubDriverFactory::new());
        let mut config = quick_config();
        config.min_size = 3;
        config.max_size = 4;
        config.prewarm_count = 3;
        let pool = SessionPool::new(config, factory);
        pool.start().await;
        assert_eq!(pool.counts().total, 3);

        pool.resize(1, 1).await;
        assert_eq!(pool.counts().total, 1);

        pool.resize(2, 4).await;
        assert_eq!(pool.counts().total, 2);
    }

    #[tokio::test]
    async fn creation_failure_surfaces_and_frees_the_slot() {
        let factory = Arc::new(StubDriverFactory::new());
        factory.behavior().fail_next_creates(2);
        let pool = SessionPool::new(
            PoolConfig {
                min_size: 0,
                max_size: 1,
                prewarm_count: 0,
                ..quick_config()
            },
            factory,
        );
        pool.start().await;

        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, PoolError::CreationFailed(_)));
        // The failed create released its reserved slot.
        assert_eq!(pool.counts().pending_creates, 0);
    }
}
