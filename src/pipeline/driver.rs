//! Browser page driver: the only place that talks to Chrome.
//!
//! The render protocol needs a handful of page operations: navigate, wait
//! for a selector, click, evaluate a script, read markup, screenshot an
//! element. [`PageDriver`] names exactly those, so the protocol in
//! [`crate::pipeline::render`] can be exercised against a scripted fake and
//! the Chrome backend stays replaceable.
//!
//! Every wait takes an explicit timeout; there is no unbounded suspension
//! point anywhere in the driver.
//!
//! `headless_chrome` is a blocking client. Drivers are created and used on a
//! `spawn_blocking` worker thread and never cross threads.

use headless_chrome::protocol::cdp::Browser::{GrantPermissions, PermissionType};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::util::Wait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Poll interval for visibility waits.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Visible-and-laid-out check evaluated with the element as `this`.
const IS_VISIBLE_FN: &str = "function() { \
    const style = window.getComputedStyle(this); \
    const rect = this.getBoundingClientRect(); \
    return style.visibility !== 'hidden' && style.display !== 'none' \
        && rect.width > 0 && rect.height > 0; }";

/// Page-level failures.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A bounded wait expired.
    #[error("timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { what: String, after: Duration },

    /// Chrome could not be started.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Any other protocol or script error.
    #[error("{0}")]
    Protocol(String),
}

impl DriverError {
    fn protocol(e: impl std::fmt::Display) -> Self {
        DriverError::Protocol(e.to_string())
    }
}

/// Whether a selector wait also requires the element to be visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Present in the DOM.
    Attached,
    /// Present, displayed and with a non-empty box.
    Visible,
}

/// One exclusively owned browser page.
///
/// Methods take `&mut self`: a page is single-occupancy and two flows can
/// never drive it at once.
pub trait PageDriver {
    /// Load `url` and wait until the page has settled.
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until `selector` matches an element in the requested state.
    fn wait_for(
        &mut self,
        selector: &str,
        visibility: Visibility,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Click the first element matching `selector`.
    fn click(&mut self, selector: &str) -> Result<(), DriverError>;

    /// Evaluate an expression in the page, awaiting a returned promise.
    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, DriverError>;

    /// Serialized outer markup of `selector`, `None` if it is not in the DOM.
    fn outer_html(&mut self, selector: &str) -> Result<Option<String>, DriverError>;

    /// PNG screenshot clipped to `selector`, `None` if it is not in the DOM.
    fn screenshot_element(&mut self, selector: &str) -> Result<Option<Vec<u8>>, DriverError>;

    /// Release the page and its browser. Later calls are no-ops.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens pages. One launch = one browser process with one page.
pub trait SessionLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

/// Whether loading `next` from `current` stays inside the same document:
/// the two URLs differ at most in their `#` fragment and `next` has one.
pub fn same_document(current: Option<&str>, next: &str) -> bool {
    fn document(url: &str) -> &str {
        url.split_once('#').map_or(url, |(doc, _)| doc)
    }
    match current {
        Some(current) => next.contains('#') && document(current) == document(next),
        None => false,
    }
}

// ── Chrome backend ───────────────────────────────────────────────────────

/// Launch settings for [`ChromeLauncher`].
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub idle_browser_timeout: Duration,
    /// Origin granted clipboard access for link exports.
    pub clipboard_origin: Option<String>,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            idle_browser_timeout: Duration::from_secs(120),
            clipboard_origin: None,
        }
    }
}

/// Launches local Chrome/Chromium through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }
}

impl SessionLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let browser = Browser::new(LaunchOptions {
            headless: self.options.headless,
            window_size: Some(self.options.window_size),
            idle_browser_timeout: self.options.idle_browser_timeout,
            ..Default::default()
        })
        .map_err(|e| DriverError::Launch(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        if let Some(ref origin) = self.options.clipboard_origin {
            let grant = tab.call_method(GrantPermissions {
                permissions: vec![
                    PermissionType::ClipboardReadWrite,
                    PermissionType::ClipboardSanitizedWrite,
                ],
                origin: Some(origin.clone()),
                browser_context_id: None,
            });
            if let Err(e) = grant {
                warn!("Could not grant clipboard access to {}: {}", origin, e);
            }
        }

        debug!(
            "Browser launched (headless={}, window={:?})",
            self.options.headless, self.options.window_size
        );
        Ok(Box::new(ChromePage {
            browser: Some(browser),
            tab,
            current_url: None,
        }))
    }
}

/// A single Chrome tab plus the browser process that owns it.
pub struct ChromePage {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    /// Last URL navigated to, if any.
    current_url: Option<String>,
}

impl ChromePage {
    fn find(&self, selector: &str) -> Option<Element<'_>> {
        self.tab.find_element(selector).ok()
    }

    fn is_visible(element: &Element<'_>) -> bool {
        element
            .call_js_fn(IS_VISIBLE_FN, vec![], false)
            .ok()
            .and_then(|r| r.value)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

impl PageDriver for ChromePage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.tab.set_default_timeout(timeout);
        let reload = same_document(self.current_url.as_deref(), url);
        self.tab.navigate_to(url).map_err(DriverError::protocol)?;
        self.current_url = Some(url.to_string());
        if reload {
            // A fragment change fires no load events; force a fresh document.
            debug!("Fragment-only navigation, reloading");
            self.tab.reload(false, None).map_err(DriverError::protocol)?;
        }
        self.tab.wait_until_navigated().map_err(|e| {
            debug!("Navigation did not settle: {}", e);
            DriverError::Timeout {
                what: "page load".into(),
                after: timeout,
            }
        })?;
        Ok(())
    }

    fn wait_for(
        &mut self,
        selector: &str,
        visibility: Visibility,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        Wait::new(timeout, POLL_INTERVAL)
            .until(|| {
                let element = self.find(selector)?;
                match visibility {
                    Visibility::Attached => Some(()),
                    Visibility::Visible => Self::is_visible(&element).then_some(()),
                }
            })
            .map_err(|_| DriverError::Timeout {
                what: selector.to_string(),
                after: timeout,
            })
    }

    fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        let element = self
            .tab
            .find_element(selector)
            .map_err(DriverError::protocol)?;
        element.click().map_err(DriverError::protocol)?;
        Ok(())
    }

    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, DriverError> {
        let remote = self
            .tab
            .evaluate(expression, true)
            .map_err(DriverError::protocol)?;
        Ok(remote.value.unwrap_or(serde_json::Value::Null))
    }

    fn outer_html(&mut self, selector: &str) -> Result<Option<String>, DriverError> {
        match self.find(selector) {
            Some(element) => element.get_content().map(Some).map_err(DriverError::protocol),
            None => Ok(None),
        }
    }

    fn screenshot_element(&mut self, selector: &str) -> Result<Option<Vec<u8>>, DriverError> {
        match self.find(selector) {
            Some(element) => element
                .capture_screenshot(CaptureScreenshotFormatOption::Png)
                .map(Some)
                .map_err(DriverError::protocol),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        let closed = self.tab.close(true).map(|_| ()).map_err(DriverError::protocol);
        // Dropping the handle terminates the browser process.
        drop(browser);
        closed
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if self.browser.is_some() {
            if let Err(e) = self.close() {
                warn!("Browser close on drop failed: {}", e);
            }
        }
    }
}
