//! In-memory audit trail of permission-check decisions.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Fixed capacity; oldest decisions drop first.
pub const AUDIT_LOG_CAP: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Bounded ring of audit events guarded by its own lock; never held across
/// a driver call.
#[derive(Debug)]
pub struct AuditLog {
    events: Mutex<VecDeque<AuditEvent>>,
    cap: usize,
}

impl AuditLog {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(cap.min(64))),
            cap,
        }
    }

    pub fn record(
        &self,
        identity: Option<&str>,
        resource: &str,
        action: &str,
        allowed: bool,
        reason: Option<String>,
    ) {
        let mut events = self.events.lock();
        if events.len() == self.cap {
            events.pop_front();
        }
        events.push_back(AuditEvent {
            timestamp: Utc::now(),
            identity: identity.map(str::to_string),
            resource: resource.to_string(),
            action: action.to_string(),
            allowed,
            reason,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of recorded denials still in the window.
    #[must_use]
    pub fn denial_count(&self) -> usize {
        self.events.lock().iter().filter(|e| !e.allowed).count()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(AUDIT_LOG_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.record(None, "r", &format!("a{i}"), i % 2 == 0, None);
        }
        assert_eq!(log.len(), 3);
        let actions: Vec<_> = log.snapshot().iter().map(|e| e.action.clone()).collect();
        assert_eq!(actions, vec!["a2", "a3", "a4"]);
    }
}
