//! Session records: one driver handle plus the metadata describing its
//! automation state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::driver::{BrowserKind, DriverConnection, DriverHandle};

/// Bounded action history per session. Oldest entries drop first.
pub const ACTION_HISTORY_CAP: usize = 10;

/// One completed tool action against a session.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity ring with overwrite-at-tail semantics.
#[derive(Debug)]
pub struct ActionHistory {
    entries: VecDeque<ActionRecord>,
    cap: usize,
}

impl ActionHistory {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, record: ActionRecord) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionRecord> {
        self.entries.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<ActionRecord> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(ACTION_HISTORY_CAP)
    }
}

/// Aggregate performance counters for one session.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerfCounters {
    pub total_actions: u64,
    pub successful_actions: u64,
    /// Mean duration over the window the action history covers.
    pub rolling_avg_ms: f64,
}

/// A usable automation context: exclusive driver handle plus lifecycle,
/// health, and activity metadata. The pool owns every record; exclusivity
/// while borrowed is what serializes access to the underlying browser.
pub struct SessionRecord {
    id: String,
    driver: DriverHandle,
    browser_kind: BrowserKind,
    created_at: Instant,
    created_wall: DateTime<Utc>,
    last_used_at: Instant,
    last_health_check: Instant,
    ready: bool,
    in_use: bool,
    use_count: u64,
    consecutive_errors: u32,
    history: ActionHistory,
    perf: PerfCounters,
    /// Last scroll offset a tool applied, if any.
    scroll_position: Option<(i64, i64)>,
    /// Selector of the element a tool last interacted with.
    active_element: Option<String>,
}

impl SessionRecord {
    #[must_use]
    pub fn new(driver: DriverHandle) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            browser_kind: driver.kind(),
            driver,
            created_at: now,
            created_wall: Utc::now(),
            last_used_at: now,
            last_health_check: now,
            ready: true,
            in_use: false,
            use_count: 0,
            consecutive_errors: 0,
            history: ActionHistory::default(),
            perf: PerfCounters::default(),
            scroll_position: None,
            active_element: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn browser_kind(&self) -> BrowserKind {
        self.browser_kind
    }

    #[must_use]
    pub fn conn(&self) -> &dyn DriverConnection {
        self.driver.conn()
    }

    #[must_use]
    pub fn driver(&self) -> &DriverHandle {
        &self.driver
    }

    #[must_use]
    pub fn created_wall(&self) -> DateTime<Utc> {
        self.created_wall
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    #[must_use]
    pub fn last_health_check(&self) -> Instant {
        self.last_health_check
    }

    pub fn note_health_check(&mut self) {
        self.last_health_check = Instant::now();
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    #[must_use]
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    #[must_use]
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn bump_errors(&mut self) {
        self.consecutive_errors += 1;
    }

    #[must_use]
    pub fn perf(&self) -> PerfCounters {
        self.perf
    }

    #[must_use]
    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    #[must_use]
    pub fn scroll_position(&self) -> Option<(i64, i64)> {
        self.scroll_position
    }

    pub fn set_scroll_position(&mut self, x: i64, y: i64) {
        self.scroll_position = Some((x, y));
    }

    #[must_use]
    pub fn active_element(&self) -> Option<&str> {
        self.active_element.as_deref()
    }

    pub fn set_active_element(&mut self, selector: impl Into<String>) {
        self.active_element = Some(selector.into());
    }

    /// Transition to in-use. The pool calls this while holding its state
    /// lock, so no other borrower can observe the record as available.
    pub fn mark_borrowed(&mut self) {
        debug_assert!(!self.in_use, "record borrowed twice");
        self.in_use = true;
        self.use_count += 1;
        self.last_used_at = Instant::now();
    }

    /// Transition back to available.
    pub fn mark_released(&mut self, had_errors: bool) {
        self.in_use = false;
        self.last_used_at = Instant::now();
        if had_errors {
            self.consecutive_errors += 1;
        }
    }

    /// Record one completed action: history append (arrival order), counter
    /// update, and the consecutive-error bookkeeping retirement reads.
    pub fn note_action(
        &mut self,
        action: impl Into<String>,
        selector: Option<String>,
        success: bool,
        duration_ms: u64,
    ) {
        self.history.push(ActionRecord {
            action: action.into(),
            selector,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        self.perf.total_actions += 1;
        if success {
            self.perf.successful_actions += 1;
            self.consecutive_errors = 0;
        } else {
            self.consecutive_errors += 1;
        }

        let window: Vec<u64> = self.history.iter().map(|a| a.duration_ms).collect();
        if !window.is_empty() {
            self.perf.rolling_avg_ms =
                window.iter().sum::<u64>() as f64 / window.len() as f64;
        }

        self.last_used_at = Instant::now();
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("browser_kind", &self.browser_kind)
            .field("in_use", &self.in_use)
            .field("use_count", &self.use_count)
            .field("consecutive_errors", &self.consecutive_errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_never_exceeds_cap_and_drops_oldest() {
        let mut history = ActionHistory::new(3);
        for i in 0..5u64 {
            history.push(ActionRecord {
                action: format!("a{i}"),
                selector: None,
                success: true,
                duration_ms: i,
                timestamp: Utc::now(),
            });
        }
        assert_eq!(history.len(), 3);
        let actions: Vec<_> = history.iter().map(|a| a.action.clone()).collect();
        assert_eq!(actions, vec!["a2", "a3", "a4"]);
    }

    #[tokio::test]
    async fn note_action_updates_counters_and_error_streaks() {
        use crate::driver::stub::StubDriverFactory;
        use crate::driver::{DriverFactory, DriverOptions};

        let factory = StubDriverFactory::new();
        let handle = factory
            .create(BrowserKind::Chromium, &DriverOptions::default())
            .await
            .unwrap();
        let mut record = SessionRecord::new(handle);

        record.note_action("navigate", None, false, 100);
        record.note_action("navigate", None, false, 200);
        assert_eq!(record.consecutive_errors(), 2);

        record.note_action("click", Some("#a".into()), true, 60);
        assert_eq!(record.consecutive_errors(), 0);
        assert_eq!(record.perf().total_actions, 3);
        assert_eq!(record.perf().successful_actions, 1);
        assert!((record.perf().rolling_avg_ms - 120.0).abs() < 1e-9);
        assert_eq!(record.history().len(), 3);
    }
}
