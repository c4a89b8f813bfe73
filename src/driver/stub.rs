//! In-memory driver used by the test suites and by offline smoke runs.
//!
//! The stub keeps a tiny model of a browser (current URL, windows, cookies,
//! a script result queue) and can be scripted to fail, which is how the
//! retirement and transport-loss paths get exercised without a real
//! WebDriver endpoint.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    BrowserKind, CookieSpec, DriverConnection, DriverError, DriverFactory, DriverHandle,
    DriverOptions, DriverResult, Selector, WindowRect,
};

/// Shared behavior knobs for every connection a [`StubDriverFactory`] hands
/// out. Cloneable so tests can keep a handle after the factory moves.
#[derive(Clone, Default)]
pub struct StubBehavior {
    inner: Arc<BehaviorState>,
}

#[derive(Default)]
struct BehaviorState {
    /// Fail this many upcoming `create` calls.
    fail_creates: AtomicUsize,
    /// Fail this many upcoming tool-facing calls with a transport loss.
    fail_calls: AtomicUsize,
    /// Artificial latency added to every tool-facing call.
    latency: Mutex<Duration>,
    /// Queued results for `execute`; falls back to `null` when empty.
    script_results: Mutex<VecDeque<Value>>,
    /// When true, `ping` and probes report the transport dead.
    dead: Mutex<bool>,
    /// Message of the currently open dialog, if any.
    dialog: Mutex<Option<String>>,
}

impl StubBehavior {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.inner.fail_creates.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_calls(&self, n: usize) {
        self.inner.fail_calls.store(n, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    pub fn push_script_result(&self, value: Value) {
        self.inner.script_results.lock().push_back(value);
    }

    pub fn set_dead(&self, dead: bool) {
        *self.inner.dead.lock() = dead;
    }

    /// Open a dialog on every page this behavior drives, so dialog tools
    /// have something to act on.
    pub fn open_dialog(&self, message: impl Into<String>) {
        *self.inner.dialog.lock() = Some(message.into());
    }

    fn take_create_failure(&self) -> bool {
        self.inner
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn gate(&self, context: &str) -> DriverResult<()> {
        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if *self.inner.dead.lock() {
            return Err(DriverError::TransportLost(format!(
                "stub transport down ({context})"
            )));
        }
        let failed = self
            .inner
            .fail_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DriverError::Other(format!(
                "stub injected failure ({context})"
            )));
        }
        Ok(())
    }
}

/// Factory producing [`StubConnection`]s; counts creations and closures so
/// tests can assert pool churn.
pub struct StubDriverFactory {
    behavior: StubBehavior,
    created: AtomicU64,
    closed: AtomicU64,
}

impl StubDriverFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(StubBehavior::new())
    }

    #[must_use]
    pub fn with_behavior(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            created: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn behavior(&self) -> StubBehavior {
        self.behavior.clone()
    }

    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closed_count(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for StubDriverFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriverFactory for StubDriverFactory {
    async fn create(
        &self,
        kind: BrowserKind,
        _options: &DriverOptions,
    ) -> Result<DriverHandle, DriverError> {
        if self.behavior.take_create_failure() {
            return Err(DriverError::CreationFailed {
                kind,
                reason: "stub injected create failure".to_string(),
            });
        }
        let serial = self.created.fetch_add(1, Ordering::SeqCst);
        let conn = StubConnection::new(self.behavior.clone());
        Ok(DriverHandle::new(kind, serial, "stub://local", Box::new(conn)))
    }

    async fn close(&self, handle: &DriverHandle) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        handle.conn().shutdown().await;
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    windows: Vec<String>,
    active_window: usize,
    cookies: Vec<CookieSpec>,
}

/// The stub connection: a small in-memory page model.
pub struct StubConnection {
    behavior: StubBehavior,
    state: Mutex<PageState>,
    next_window: AtomicU64,
}

impl StubConnection {
    fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                windows: vec!["window-0".to_string()],
                active_window: 0,
                cookies: Vec::new(),
            }),
            next_window: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl DriverConnection for StubConnection {
    async fn navigate(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.behavior.gate("navigate").await?;
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn back(&self) -> DriverResult<()> {
        self.behavior.gate("back").await
    }

    async fn forward(&self) -> DriverResult<()> {
        self.behavior.gate("forward").await
    }

    async fn reload(&self) -> DriverResult<()> {
        self.behavior.gate("reload").await
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.behavior.gate("current_url").await?;
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> DriverResult<String> {
        self.behavior.gate("title").await?;
        Ok("Stub Page".to_string())
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.behavior.gate("page_source").await?;
        Ok("<html><body>stub</body></html>".to_string())
    }

    async fn exists(&self, _selector: &Selector) -> DriverResult<bool> {
        self.behavior.gate("exists").await?;
        Ok(true)
    }

    async fn click(&self, selector: &Selector) -> DriverResult<()> {
        self.behavior.gate(selector.as_str()).await
    }

    async fn type_text(
        &self,
        selector: &Selector,
        _text: &str,
        _clear_first: bool,
    ) -> DriverResult<()> {
        self.behavior.gate(selector.as_str()).await
    }

    async fn select_value(&self, selector: &Selector, _value: &str) -> DriverResult<()> {
        self.behavior.gate(selector.as_str()).await
    }

    async fn hover(&self, selector: &Selector) -> DriverResult<()> {
        self.behavior.gate(selector.as_str()).await
    }

    async fn element_text(&self, selector: &Selector) -> DriverResult<String> {
        self.behavior.gate(selector.as_str()).await?;
        Ok(format!("text of {selector}"))
    }

    async fn element_attr(
        &self,
        selector: &Selector,
        name: &str,
    ) -> DriverResult<Option<String>> {
        self.behavior.gate(selector.as_str()).await?;
        Ok(Some(format!("{name}-value")))
    }

    async fn element_css(&self, selector: &Selector, property: &str) -> DriverResult<String> {
        self.behavior.gate(selector.as_str()).await?;
        Ok(format!("{property}: stub"))
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.behavior.gate("screenshot").await?;
        // Smallest valid PNG header so capture paths have bytes to write.
        Ok(vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'])
    }

    async fn execute(
        &self,
        _script: &str,
        _args: Vec<Value>,
        _timeout: Duration,
    ) -> DriverResult<Value> {
        self.behavior.gate("execute").await?;
        Ok(self
            .behavior
            .inner
            .script_results
            .lock()
            .pop_front()
            .unwrap_or(Value::Null))
    }

    async fn dialog_accept(&self) -> DriverResult<()> {
        self.behavior.gate("dialog").await?;
        match self.behavior.inner.dialog.lock().take() {
            Some(_) => Ok(()),
            None => Err(DriverError::NoDialog),
        }
    }

    async fn dialog_dismiss(&self) -> DriverResult<()> {
        self.behavior.gate("dialog").await?;
        match self.behavior.inner.dialog.lock().take() {
            Some(_) => Ok(()),
            None => Err(DriverError::NoDialog),
        }
    }

    async fn dialog_text(&self) -> DriverResult<String> {
        self.behavior.gate("dialog").await?;
        self.behavior
            .inner
            .dialog
            .lock()
            .clone()
            .ok_or(DriverError::NoDialog)
    }

    async fn dialog_send_text(&self, _text: &str) -> DriverResult<()> {
        self.behavior.gate("dialog").await?;
        if self.behavior.inner.dialog.lock().is_some() {
            Ok(())
        } else {
            Err(DriverError::NoDialog)
        }
    }

    async fn windows(&self) -> DriverResult<Vec<String>> {
        self.behavior.gate("windows").await?;
        Ok(self.state.lock().windows.clone())
    }

    async fn active_window(&self) -> DriverResult<String> {
        self.behavior.gate("active_window").await?;
        let state = self.state.lock();
        Ok(state.windows[state.active_window].clone())
    }

    async fn switch_window(&self, handle: &str) -> DriverResult<()> {
        self.behavior.gate(handle).await?;
        let mut state = self.state.lock();
        match state.windows.iter().position(|w| w == handle) {
            Some(idx) => {
                state.active_window = idx;
                Ok(())
            }
            None => Err(DriverError::ElementNotFound(format!("window {handle}"))),
        }
    }

    async fn open_window(&self, _as_tab: bool) -> DriverResult<String> {
        self.behavior.gate("open_window").await?;
        let handle = format!("window-{}", self.next_window.fetch_add(1, Ordering::SeqCst));
        self.state.lock().windows.push(handle.clone());
        Ok(handle)
    }

    async fn close_window(&self) -> DriverResult<()> {
        self.behavior.gate("close_window").await?;
        let mut state = self.state.lock();
        let idx = state.active_window;
        if state.windows.len() > 1 {
            state.windows.remove(idx);
            state.active_window = 0;
        }
        Ok(())
    }

    async fn window_rect(&self) -> DriverResult<WindowRect> {
        self.behavior.gate("window_rect").await?;
        Ok(WindowRect {
            x: 0,
            y: 0,
            width: 1280,
            height: 720,
        })
    }

    async fn set_window_rect(&self, rect: WindowRect) -> DriverResult<WindowRect> {
        self.behavior.gate("set_window_rect").await?;
        // Model the driver clamping wholly off-screen placements to origin.
        let clamped_x = rect.x.clamp(-(rect.width as i64) + 1, 10_000);
        Ok(WindowRect {
            x: clamped_x,
            y: rect.y.clamp(-(rect.height as i64) + 1, 10_000),
            width: rect.width,
            height: rect.height,
        })
    }

    async fn switch_frame(&self, selector: &Selector) -> DriverResult<()> {
        self.behavior.gate(selector.as_str()).await
    }

    async fn parent_frame(&self) -> DriverResult<()> {
        self.behavior.gate("parent_frame").await
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieSpec>> {
        self.behavior.gate("cookies").await?;
        Ok(self.state.lock().cookies.clone())
    }

    async fn add_cookie(&self, cookie: CookieSpec) -> DriverResult<()> {
        self.behavior.gate("add_cookie").await?;
        let mut state = self.state.lock();
        state.cookies.retain(|c| c.name != cookie.name);
        state.cookies.push(cookie);
        Ok(())
    }

    async fn delete_cookie(&self, name: &str) -> DriverResult<()> {
        self.behavior.gate("delete_cookie").await?;
        self.state.lock().cookies.retain(|c| c.name != name);
        Ok(())
    }

    async fn clear_cookies(&self) -> DriverResult<()> {
        self.behavior.gate("clear_cookies").await?;
        self.state.lock().cookies.clear();
        Ok(())
    }

    async fn ping(&self) -> bool {
        !*self.behavior.inner.dead.lock()
            && self.behavior.inner.fail_calls.load(Ordering::SeqCst) == 0
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_call_failures_are_spent_one_by_one() {
        let factory = StubDriverFactory::new();
        let handle = factory
            .create(BrowserKind::Chromium, &DriverOptions::default())
            .await
            .unwrap();

        factory.behavior().fail_next_calls(1);
        let err = handle
            .conn()
            .navigate("https://example.test/", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Other(_)));

        // The budget is spent; the next call goes through.
        handle
            .conn()
            .navigate("https://example.test/", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            handle.conn().current_url().await.unwrap(),
            "https://example.test/"
        );
    }

    #[tokio::test]
    async fn create_failures_are_scripted() {
        let factory = StubDriverFactory::new();
        factory.behavior().fail_next_creates(1);
        assert!(factory
            .create(BrowserKind::Firefox, &DriverOptions::default())
            .await
            .is_err());
        assert!(factory
            .create(BrowserKind::Firefox, &DriverOptions::default())
            .await
            .is_ok());
    }
}
