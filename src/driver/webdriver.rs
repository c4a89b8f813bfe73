//! W3C WebDriver implementation of the driver capability surface.
//!
//! One [`WebDriverFactory`] fronts a single WebDriver endpoint (chromedriver,
//! geckodriver, or a Selenium-style hub) and launches sessions of either
//! browser kind against it. All transport failures are classified into
//! [`DriverError`] here so the rest of the crate never sees a raw
//! `WebDriverError`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use tracing::debug;

use super::{
    BrowserKind, CookieSpec, DriverConnection, DriverError, DriverFactory, DriverHandle,
    DriverOptions, DriverResult, Selector, WindowRect,
};

const SELECT_VALUE_SCRIPT: &str = r#"
    const el = arguments[0];
    const value = arguments[1];
    let matched = false;
    for (const opt of el.options) {
        if (opt.value === value) {
            opt.selected = true;
            matched = true;
        }
    }
    if (!matched) { return false; }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
"#;

/// Factory that launches sessions against one WebDriver endpoint.
pub struct WebDriverFactory {
    endpoint: String,
    next_serial: AtomicU64,
}

impl WebDriverFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            next_serial: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build a W3C capability map for the requested kind and options.
    fn capabilities(kind: BrowserKind, options: &DriverOptions) -> Map<String, Value> {
        let mut caps = Map::new();

        match kind {
            BrowserKind::Chromium => {
                let mut args = vec![
                    "--no-sandbox".to_string(),
                    "--disable-dev-shm-usage".to_string(),
                    "--disable-gpu".to_string(),
                ];
                if options.headless {
                    args.push("--headless".to_string());
                }
                if let Some(size) = options.window_size {
                    args.push(format!("--window-size={},{}", size.w, size.h));
                }
                if let Some(ua) = &options.user_agent {
                    args.push(format!("--user-agent={ua}"));
                }
                args.extend(options.extra_args.iter().cloned());

                caps.insert("browserName".to_string(), json!("chrome"));
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
            BrowserKind::Firefox => {
                let mut args = Vec::new();
                if options.headless {
                    args.push("--headless".to_string());
                }
                if let Some(size) = options.window_size {
                    args.push(format!("--width={}", size.w));
                    args.push(format!("--height={}", size.h));
                }
                args.extend(options.extra_args.iter().cloned());

                let mut firefox_options = json!({ "args": args });
                if let Some(ua) = &options.user_agent {
                    firefox_options["prefs"] = json!({
                        "general.useragent.override": ua,
                    });
                }

                caps.insert("browserName".to_string(), json!("firefox"));
                caps.insert("moz:firefoxOptions".to_string(), firefox_options);
            }
        }

        caps.insert("acceptInsecureCerts".to_string(), json!(true));
        caps.insert("pageLoadStrategy".to_string(), json!("normal"));
        caps
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn create(
        &self,
        kind: BrowserKind,
        options: &DriverOptions,
    ) -> Result<DriverHandle, DriverError> {
        let caps = Self::capabilities(kind, options);

        let driver =
            WebDriver::new(&self.endpoint, caps)
                .await
                .map_err(|err| DriverError::CreationFailed {
                    kind,
                    reason: err.to_string(),
                })?;

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        debug!(%kind, serial, endpoint = %self.endpoint, "webdriver session created");

        let conn = WebDriverConnection { driver };
        Ok(DriverHandle::new(kind, serial, self.endpoint.clone(), Box::new(conn)))
    }
}

/// A live WebDriver session implementing the uniform capability set.
struct WebDriverConnection {
    driver: WebDriver,
}

impl WebDriverConnection {
    fn by(selector: &Selector) -> By {
        match selector {
            Selector::Css(css) => By::Css(css.as_str()),
            Selector::XPath(xp) => By::XPath(xp.as_str()),
        }
    }

    async fn find(&self, selector: &Selector) -> DriverResult<WebElement> {
        self.driver
            .find(Self::by(selector))
            .await
            .map_err(|err| classify(&err, selector.as_str()))
    }
}

fn classify(err: &WebDriverError, context: &str) -> DriverError {
    classify_message(&err.to_string(), context)
}

/// Classify a WebDriver error by its message, the only portable signal the
/// protocol gives us across chromedriver and geckodriver.
fn classify_message(msg: &str, context: &str) -> DriverError {
    let lower = msg.to_lowercase();

    if lower.contains("stale element") {
        DriverError::StaleElement(context.to_string())
    } else if lower.contains("no such element") || lower.contains("unable to locate element") {
        DriverError::ElementNotFound(context.to_string())
    } else if lower.contains("not interactable")
        || lower.contains("click intercepted")
        || lower.contains("not clickable")
    {
        DriverError::ElementNotInteractable(context.to_string())
    } else if lower.contains("no such alert") || lower.contains("no alert") {
        DriverError::NoDialog
    } else if lower.contains("invalid session")
        || lower.contains("session not created")
        || lower.contains("session deleted")
        || lower.contains("disconnected")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("browser has closed")
    {
        DriverError::TransportLost(msg.to_string())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        DriverError::Timeout {
            operation: context.to_string(),
            timeout_ms: 0,
        }
    } else {
        DriverError::Other(msg.to_string())
    }
}

#[async_trait]
impl DriverConnection for WebDriverConnection {
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        match tokio::time::timeout(timeout, self.driver.goto(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(classify(&err, url)),
            Err(_) => Err(DriverError::timeout(format!("navigation to {url}"), timeout)),
        }
    }

    async fn back(&self) -> DriverResult<()> {
        self.driver.back().await.map_err(|e| classify(&e, "back"))
    }

    async fn forward(&self) -> DriverResult<()> {
        self.driver
            .forward()
            .await
            .map_err(|e| classify(&e, "forward"))
    }

    async fn reload(&self) -> DriverResult<()> {
        self.driver
            .refresh()
            .await
            .map_err(|e| classify(&e, "reload"))
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.driver
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| classify(&e, "current_url"))
    }

    async fn title(&self) -> DriverResult<String> {
        self.driver.title().await.map_err(|e| classify(&e, "title"))
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.driver
            .source()
            .await
            .map_err(|e| classify(&e, "page_source"))
    }

    async fn exists(&self, selector: &Selector) -> DriverResult<bool> {
        match self.find(selector).await {
            Ok(_) => Ok(true),
            Err(DriverError::ElementNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn click(&self, selector: &Selector) -> DriverResult<()> {
        let elem = self.find(selector).await?;
        elem.click()
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn type_text(
        &self,
        selector: &Selector,
        text: &str,
        clear_first: bool,
    ) -> DriverResult<()> {
        let elem = self.find(selector).await?;
        if clear_first {
            elem.clear()
                .await
                .map_err(|e| classify(&e, selector.as_str()))?;
        }
        elem.send_keys(text)
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn select_value(&self, selector: &Selector, value: &str) -> DriverResult<()> {
        let elem = self.find(selector).await?;
        let elem_arg = elem
            .to_json()
            .map_err(|e| classify(&e, selector.as_str()))?;
        let matched = self
            .driver
            .execute(SELECT_VALUE_SCRIPT, vec![elem_arg, json!(value)])
            .await
            .map_err(|e| classify(&e, selector.as_str()))?
            .convert::<bool>()
            .unwrap_or(false);
        if matched {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(format!(
                "{selector} option[value={value}]"
            )))
        }
    }

    async fn hover(&self, selector: &Selector) -> DriverResult<()> {
        let elem = self.find(selector).await?;
        self.driver
            .action_chain()
            .move_to_element_center(&elem)
            .perform()
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn element_text(&self, selector: &Selector) -> DriverResult<String> {
        let elem = self.find(selector).await?;
        elem.text()
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn element_attr(
        &self,
        selector: &Selector,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let elem = self.find(selector).await?;
        elem.attr(name)
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn element_css(&self, selector: &Selector, property: &str) -> DriverResult<String> {
        let elem = self.find(selector).await?;
        elem.css_value(property)
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.driver
            .screenshot_as_png()
            .await
            .map_err(|e| classify(&e, "screenshot"))
    }

    async fn execute(
        &self,
        script: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> DriverResult<Value> {
        match tokio::time::timeout(timeout, self.driver.execute(script, args)).await {
            Ok(Ok(ret)) => ret
                .convert::<Value>()
                .map_err(|e| classify(&e, "script result")),
            Ok(Err(err)) => Err(classify(&err, "script")),
            Err(_) => Err(DriverError::timeout("script execution", timeout)),
        }
    }

    async fn dialog_accept(&self) -> DriverResult<()> {
        self.driver
            .accept_alert()
            .await
            .map_err(|e| classify(&e, "dialog"))
    }

    async fn dialog_dismiss(&self) -> DriverResult<()> {
        self.driver
            .dismiss_alert()
            .await
            .map_err(|e| classify(&e, "dialog"))
    }

    async fn dialog_text(&self) -> DriverResult<String> {
        self.driver
            .get_alert_text()
            .await
            .map_err(|e| classify(&e, "dialog"))
    }

    async fn dialog_send_text(&self, text: &str) -> DriverResult<()> {
        self.driver
            .send_alert_text(text)
            .await
            .map_err(|e| classify(&e, "dialog"))
    }

    async fn windows(&self) -> DriverResult<Vec<String>> {
        self.driver
            .windows()
            .await
            .map(|handles| handles.iter().map(|h| h.to_string()).collect())
            .map_err(|e| classify(&e, "windows"))
    }

    async fn active_window(&self) -> DriverResult<String> {
        self.driver
            .window()
            .await
            .map(|h| h.to_string())
            .map_err(|e| classify(&e, "active_window"))
    }

    async fn switch_window(&self, handle: &str) -> DriverResult<()> {
        let handles = self
            .driver
            .windows()
            .await
            .map_err(|e| classify(&e, "windows"))?;
        let target = handles
            .into_iter()
            .find(|h| h.to_string() == handle)
            .ok_or_else(|| DriverError::ElementNotFound(format!("window {handle}")))?;
        self.driver
            .switch_to_window(target)
            .await
            .map_err(|e| classify(&e, handle))
    }

    async fn open_window(&self, as_tab: bool) -> DriverResult<String> {
        let handle = if as_tab {
            self.driver.new_tab().await
        } else {
            self.driver.new_window().await
        }
        .map_err(|e| classify(&e, "open_window"))?;
        Ok(handle.to_string())
    }

    async fn close_window(&self) -> DriverResult<()> {
        self.driver
            .close_window()
            .await
            .map_err(|e| classify(&e, "close_window"))
    }

    async fn window_rect(&self) -> DriverResult<WindowRect> {
        let rect = self
            .driver
            .get_window_rect()
            .await
            .map_err(|e| classify(&e, "window_rect"))?;
        Ok(WindowRect {
            x: rect.x,
            y: rect.y,
            width: rect.width.max(0) as u32,
            height: rect.height.max(0) as u32,
        })
    }

    async fn set_window_rect(&self, rect: WindowRect) -> DriverResult<WindowRect> {
        self.driver
            .set_window_rect(
                rect.x.try_into().unwrap_or_default(),
                rect.y.try_into().unwrap_or_default(),
                rect.width,
                rect.height,
            )
            .await
            .map_err(|e| classify(&e, "set_window_rect"))?;
        // Drivers clamp off-screen rects; report what was actually applied.
        self.window_rect().await
    }

    async fn switch_frame(&self, selector: &Selector) -> DriverResult<()> {
        let elem = self.find(selector).await?;
        elem.enter_frame()
            .await
            .map_err(|e| classify(&e, selector.as_str()))
    }

    async fn parent_frame(&self) -> DriverResult<()> {
        self.driver
            .enter_parent_frame()
            .await
            .map_err(|e| classify(&e, "parent_frame"))
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieSpec>> {
        let cookies = self
            .driver
            .get_all_cookies()
            .await
            .map_err(|e| classify(&e, "cookies"))?;
        Ok(cookies
            .into_iter()
            .map(|c| CookieSpec {
                name: c.name.clone(),
                value: c.value.clone(),
                path: c.path.clone(),
                domain: c.domain.clone(),
                secure: c.secure,
                expiry: c.expiry,
            })
            .collect())
    }

    async fn add_cookie(&self, cookie: CookieSpec) -> DriverResult<()> {
        let mut out = Cookie::new(cookie.name, cookie.value);
        out.path = cookie.path;
        out.domain = cookie.domain;
        out.secure = cookie.secure;
        out.expiry = cookie.expiry;
        self.driver
            .add_cookie(out)
            .await
            .map_err(|e| classify(&e, "add_cookie"))
    }

    async fn delete_cookie(&self, name: &str) -> DriverResult<()> {
        self.driver
            .delete_cookie(name)
            .await
            .map_err(|e| classify(&e, name))
    }

    async fn clear_cookies(&self) -> DriverResult<()> {
        self.driver
            .delete_all_cookies()
            .await
            .map_err(|e| classify(&e, "clear_cookies"))
    }

    async fn ping(&self) -> bool {
        self.driver.title().await.is_ok()
    }

    async fn shutdown(&self) {
        if let Err(err) = self.driver.clone().quit().await {
            debug!(error = %err, "webdriver quit failed (session may already be gone)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_hands_out_monotonic_serials() {
        let factory = WebDriverFactory::new("http://localhost:4444");
        assert_eq!(factory.next_serial.fetch_add(1, Ordering::Relaxed), 0);
        assert_eq!(factory.next_serial.fetch_add(1, Ordering::Relaxed), 1);
    }

    #[test]
    fn capability_maps_carry_kind_specific_options() {
        let options = DriverOptions {
            headless: true,
            window_size: Some(super::super::WindowSize { w: 1280, h: 800 }),
            user_agent: Some("control-agent".into()),
            extra_args: vec!["--lang=en-US".into()],
        };

        let chrome = WebDriverFactory::capabilities(BrowserKind::Chromium, &options);
        assert_eq!(chrome["browserName"], json!("chrome"));
        let args = chrome["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.contains(&json!("--headless")));
        assert!(args.contains(&json!("--window-size=1280,800")));
        assert!(args.contains(&json!("--user-agent=control-agent")));
        assert!(args.contains(&json!("--lang=en-US")));

        let firefox = WebDriverFactory::capabilities(BrowserKind::Firefox, &options);
        assert_eq!(firefox["browserName"], json!("firefox"));
        assert_eq!(
            firefox["moz:firefoxOptions"]["prefs"]["general.useragent.override"],
            json!("control-agent")
        );
    }

    #[test]
    fn message_classification_covers_the_protocol_phrases() {
        assert!(matches!(
            classify_message("stale element reference: #x is stale", "#x"),
            DriverError::StaleElement(sel) if sel == "#x"
        ));
        assert!(matches!(
            classify_message("no such element: unable to locate element", "#x"),
            DriverError::ElementNotFound(_)
        ));
        assert!(matches!(
            classify_message("invalid session id", "x"),
            DriverError::TransportLost(_)
        ));
        assert!(matches!(
            classify_message("element not interactable", "#btn"),
            DriverError::ElementNotInteractable(_)
        ));
    }
}
