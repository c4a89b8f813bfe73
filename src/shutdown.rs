//! Intake lifecycle and the shutdown coordinator.
//!
//! [`Lifecycle`] counts outstanding invocations (which is also how the
//! worker cap is enforced) and flips to refusing intakes when shutdown
//! begins. [`ShutdownCoordinator`] then drains in-flight work up to a
//! deadline and tears the components down in dependency order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::error::ControlError;
use crate::health::HealthService;
use crate::session::{SessionPool, SessionRegistry};

/// Default drain window before in-flight work is abandoned.
pub const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Intake gate plus in-flight accounting.
pub struct Lifecycle {
    accepting: AtomicBool,
    workers: Arc<Semaphore>,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Lifecycle {
    #[must_use]
    pub fn new(worker_cap: usize) -> Arc<Self> {
        Arc::new(Self {
            accepting: AtomicBool::new(true),
            workers: Arc::new(Semaphore::new(worker_cap.max(1))),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    #[must_use]
    pub fn accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Admit one invocation, waiting for a worker slot under the cap.
    /// Fails immediately once shutdown has begun.
    pub async fn enter(self: &Arc<Self>) -> Result<InFlightGuard, ControlError> {
        if !self.accepting() {
            return Err(ControlError::PoolClosed);
        }
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| ControlError::PoolClosed)?;
        // Shutdown may have started while we waited for a slot.
        if !self.accepting() {
            return Err(ControlError::PoolClosed);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(InFlightGuard {
            lifecycle: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn refuse_new_intakes(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Wait for in-flight work to finish, up to `deadline`. Returns whether
    /// the system drained completely.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                return false;
            };
            let _ = tokio::time::timeout(remaining, self.idle.notified()).await;
        }
    }
}

/// RAII in-flight marker; dropping it releases the worker slot and, when
/// the system goes idle, wakes the drain.
pub struct InFlightGuard {
    lifecycle: Arc<Lifecycle>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.lifecycle.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.lifecycle.idle.notify_waiters();
        }
    }
}

/// Orderly teardown of all outstanding work.
pub struct ShutdownCoordinator {
    lifecycle: Arc<Lifecycle>,
    registry: Arc<SessionRegistry>,
    pool: Arc<SessionPool>,
    health: Arc<HealthService>,
    drain_deadline: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        registry: Arc<SessionRegistry>,
        pool: Arc<SessionPool>,
        health: Arc<HealthService>,
    ) -> Self {
        Self {
            lifecycle,
            registry,
            pool,
            health,
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }

    /// Refuse new work, drain, and destroy everything. Tasks that outlive
    /// the drain deadline are abandoned; their sessions die with the pool.
    pub async fn shutdown(&self) {
        info!("shutdown requested; refusing new intakes");
        self.lifecycle.refuse_new_intakes();

        if self.lifecycle.drain(self.drain_deadline).await {
            info!("in-flight work drained");
        } else {
            warn!(
                abandoned = self.lifecycle.in_flight(),
                "drain deadline elapsed; abandoning in-flight work"
            );
        }

        self.registry.shutdown().await;
        self.pool.shutdown().await;
        self.health.stop();

        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn intake_refused_after_shutdown_begins() {
        let lifecycle = Lifecycle::new(4);
        let guard = lifecycle.enter().await.unwrap();
        assert_eq!(lifecycle.in_flight(), 1);

        lifecycle.refuse_new_intakes();
        assert!(lifecycle.enter().await.is_err());

        drop(guard);
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_and_times_out_otherwise() {
        let lifecycle = Lifecycle::new(4);
        let guard = lifecycle.enter().await.unwrap();

        assert!(!lifecycle.drain(Duration::from_millis(50)).await);

        let drainer = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.drain(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(drainer.await.unwrap());
    }

    #[tokio::test]
    async fn worker_cap_queues_the_excess_invocation() {
        let lifecycle = Lifecycle::new(1);
        let first = lifecycle.enter().await.unwrap();

        let second = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.enter().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        drop(first);
        assert!(second.await.unwrap().is_ok());
    }
}
