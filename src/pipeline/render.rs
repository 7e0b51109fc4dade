//! Render protocol: one [`RenderRequest`] in, artifact bytes out.
//!
//! ```text
//! navigate(url) ──▶ wait surface ──▶ exporter (format-specific controls) ──▶ capture
//!   bounded          bounded          every wait bounded                    surface re-checked
//! ```
//!
//! [`render`] is the stateless protocol over any [`PageDriver`].
//! [`RenderSession`] owns the page for a whole batch and guarantees it is
//! closed exactly once, on the success path, on error and on unwind.

use crate::config::BatchConfig;
use crate::error::Stage;
use crate::pipeline::driver::{DriverError, PageDriver, SessionLauncher, Visibility};
use crate::pipeline::export::{exporter_for, ExportContext};
use crate::pipeline::request::RenderRequest;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single render failed. Mapped to [`crate::error::FileError`] by the
/// orchestrator, which knows the file path.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("timed out after {secs}s during {stage} waiting for {waited_for}")]
    Timeout {
        stage: Stage,
        waited_for: String,
        secs: u64,
    },

    #[error("render surface '{selector}' disappeared before capture")]
    SurfaceMissing { selector: String },

    #[error("browser error during {stage}: {detail}")]
    Browser { stage: Stage, detail: String },

    #[error("captured image is corrupt: {detail}")]
    CorruptCapture { detail: String },
}

impl RenderError {
    pub(crate) fn from_driver(stage: Stage, err: DriverError) -> Self {
        match err {
            DriverError::Timeout { what, after } => RenderError::Timeout {
                stage,
                waited_for: what,
                secs: after.as_secs(),
            },
            other => RenderError::Browser {
                stage,
                detail: other.to_string(),
            },
        }
    }
}

/// Endpoint, surface selector and wait bounds for the protocol.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub base_url: String,
    pub surface_selector: String,
    pub navigation_timeout: Duration,
    pub surface_timeout: Duration,
    pub control_timeout: Duration,
}

impl From<&BatchConfig> for RenderSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            surface_selector: config.surface_selector.clone(),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            surface_timeout: Duration::from_secs(config.surface_timeout_secs),
            control_timeout: Duration::from_secs(config.control_timeout_secs),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

/// Drive `page` through the full render protocol for `request`.
pub fn render(
    page: &mut dyn PageDriver,
    request: &RenderRequest,
    settings: &RenderSettings,
) -> Result<Vec<u8>, RenderError> {
    let url = request.url(&settings.base_url);
    debug!("Navigating ({} bytes of URL)", url.len());
    page.navigate(&url, settings.navigation_timeout)
        .map_err(|e| RenderError::from_driver(Stage::Navigate, e))?;

    page.wait_for(
        &settings.surface_selector,
        Visibility::Attached,
        settings.surface_timeout,
    )
    .map_err(|e| RenderError::from_driver(Stage::Surface, e))?;

    let ctx = ExportContext {
        surface_selector: &settings.surface_selector,
        scale: request.scale,
        control_timeout: settings.control_timeout,
    };
    exporter_for(request.format).export(page, &ctx)
}

/// The batch-long owner of one browser page.
pub struct RenderSession {
    page: Option<Box<dyn PageDriver>>,
    settings: RenderSettings,
}

impl RenderSession {
    /// Launch a browser page through `launcher`.
    pub fn open(
        launcher: &dyn SessionLauncher,
        settings: RenderSettings,
    ) -> Result<Self, DriverError> {
        let started = Instant::now();
        let page = launcher.launch()?;
        debug!("Render session opened in {}ms", started.elapsed().as_millis());
        Ok(Self::with_page(page, settings))
    }

    /// Wrap an already-open page.
    pub fn with_page(page: Box<dyn PageDriver>, settings: RenderSettings) -> Self {
        Self {
            page: Some(page),
            settings,
        }
    }

    /// Render one request on the session's page.
    pub fn render(&mut self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        let page = self.page.as_deref_mut().ok_or_else(|| RenderError::Browser {
            stage: Stage::Navigate,
            detail: "render session already closed".into(),
        })?;
        render(page, request, &self.settings)
    }

    /// Close the page and its browser. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut page) = self.page.take() {
            match page.close() {
                Ok(()) => debug!("Render session closed"),
                Err(e) => warn!("Render session close failed: {}", e),
            }
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportFormat, ExportScale, RenderOptions};
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([9, 9, 9, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    /// Records every call; selectors in `absent` never appear.
    struct ScriptedPage {
        calls: Vec<String>,
        navigation_hangs: bool,
        absent: Vec<&'static str>,
        surface_gone_at_capture: bool,
        clipboard: Result<serde_json::Value, ()>,
        screenshot: Vec<u8>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedPage {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                navigation_hangs: false,
                absent: Vec::new(),
                surface_gone_at_capture: false,
                clipboard: Ok(serde_json::Value::String("https://ray.so/#code=abc".into())),
                screenshot: png(),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl PageDriver for ScriptedPage {
        fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError> {
            self.calls.push(format!("navigate {}", &url[..url.find('#').unwrap_or(url.len())]));
            if self.navigation_hangs {
                return Err(DriverError::Timeout {
                    what: "page load".into(),
                    after: timeout,
                });
            }
            Ok(())
        }

        fn wait_for(
            &mut self,
            selector: &str,
            visibility: Visibility,
            timeout: Duration,
        ) -> Result<(), DriverError> {
            self.calls.push(format!("wait {selector} {visibility:?}"));
            if self.absent.iter().any(|s| *s == selector) {
                return Err(DriverError::Timeout {
                    what: selector.to_string(),
                    after: timeout,
                });
            }
            Ok(())
        }

        fn click(&mut self, selector: &str) -> Result<(), DriverError> {
            self.calls.push(format!("click {selector}"));
            Ok(())
        }

        fn evaluate(&mut self, _expression: &str) -> Result<serde_json::Value, DriverError> {
            self.calls.push("evaluate".into());
            self.clipboard
                .clone()
                .map_err(|_| DriverError::Protocol("NotAllowedError: clipboard denied".into()))
        }

        fn outer_html(&mut self, selector: &str) -> Result<Option<String>, DriverError> {
            self.calls.push(format!("outer_html {selector}"));
            Ok((!self.surface_gone_at_capture).then(|| "<div id=\"frame\"><svg/></div>".into()))
        }

        fn screenshot_element(&mut self, selector: &str) -> Result<Option<Vec<u8>>, DriverError> {
            self.calls.push(format!("screenshot {selector}"));
            Ok((!self.surface_gone_at_capture).then(|| self.screenshot.clone()))
        }

        fn close(&mut self) -> Result<(), DriverError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request(format: ExportFormat) -> RenderRequest {
        let template = RenderOptions {
            format,
            scale: ExportScale::X2,
            ..Default::default()
        };
        RenderRequest::for_file(&template, "src/a.ts", "let a = 1;".into(), "typescript")
    }

    #[test]
    fn raster_protocol_order() {
        let mut page = ScriptedPage::new();
        let bytes = render(&mut page, &request(ExportFormat::Raster), &RenderSettings::default())
            .unwrap();
        assert_eq!(bytes, png());
        assert_eq!(
            page.calls,
            vec![
                "navigate https://ray.so/".to_string(),
                "wait #frame Attached".into(),
                r#"wait button[aria-label="Save PNG"] Visible"#.into(),
                r#"click button[aria-label="Save PNG"]"#.into(),
                r#"wait button[data-size="2x"] Visible"#.into(),
                r#"click button[data-size="2x"]"#.into(),
                "screenshot #frame".into(),
            ]
        );
    }

    #[test]
    fn vector_protocol_reads_markup() {
        let mut page = ScriptedPage::new();
        let bytes = render(&mut page, &request(ExportFormat::Vector), &RenderSettings::default())
            .unwrap();
        assert_eq!(bytes, b"<div id=\"frame\"><svg/></div>".to_vec());
        assert_eq!(
            page.calls[2..],
            [
                r#"wait button[aria-label="See other export options"] Visible"#.to_string(),
                r#"click button[aria-label="See other export options"]"#.into(),
                r#"wait button[aria-label="Save SVG"] Visible"#.into(),
                r#"click button[aria-label="Save SVG"]"#.into(),
                r#"wait button[data-size="2x"] Visible"#.into(),
                r#"click button[data-size="2x"]"#.into(),
                "outer_html #frame".into(),
            ]
        );
    }

    #[test]
    fn link_protocol_skips_scale_and_screenshot() {
        let mut page = ScriptedPage::new();
        let bytes =
            render(&mut page, &request(ExportFormat::Link), &RenderSettings::default()).unwrap();
        assert_eq!(bytes, b"https://ray.so/#code=abc".to_vec());
        assert_eq!(page.calls.last().map(String::as_str), Some("evaluate"));
        assert!(!page.calls.iter().any(|c| c.contains("data-size")));
        assert!(!page.calls.iter().any(|c| c.starts_with("screenshot")));
    }

    #[test]
    fn link_clipboard_failure_is_empty_result() {
        let mut page = ScriptedPage::new();
        page.clipboard = Err(());
        let bytes =
            render(&mut page, &request(ExportFormat::Link), &RenderSettings::default()).unwrap();
        assert_eq!(bytes, "".as_bytes());

        let mut page = ScriptedPage::new();
        page.clipboard = Ok(serde_json::Value::Null);
        let bytes =
            render(&mut page, &request(ExportFormat::Link), &RenderSettings::default()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn surface_never_appears_is_timeout() {
        let mut page = ScriptedPage::new();
        page.absent.push("#frame");
        let err = render(&mut page, &request(ExportFormat::Raster), &RenderSettings::default())
            .unwrap_err();
        match err {
            RenderError::Timeout { stage, secs, .. } => {
                assert_eq!(stage, Stage::Surface);
                assert_eq!(secs, 10);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!page.calls.iter().any(|c| c.starts_with("click")));
    }

    #[test]
    fn navigation_that_never_settles_is_timeout() {
        let mut page = ScriptedPage::new();
        page.navigation_hangs = true;
        let err = render(&mut page, &request(ExportFormat::Raster), &RenderSettings::default())
            .unwrap_err();
        match err {
            RenderError::Timeout { stage, secs, .. } => {
                assert_eq!(stage, Stage::Navigate);
                assert_eq!(secs, 30);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(page.calls.len(), 1, "nothing runs after a failed load");
    }

    #[test]
    fn missing_scale_control_is_timeout() {
        for format in [ExportFormat::Raster, ExportFormat::Vector] {
            let mut page = ScriptedPage::new();
            page.absent.push(r#"button[data-size="2x"]"#);
            let err = render(&mut page, &request(format), &RenderSettings::default()).unwrap_err();
            match err {
                RenderError::Timeout {
                    stage, waited_for, ..
                } => {
                    assert_eq!(stage, Stage::Scale, "{format}");
                    assert_eq!(waited_for, r#"button[data-size="2x"]"#);
                }
                other => panic!("{format}: unexpected: {other:?}"),
            }
            assert!(!page.calls.iter().any(|c| c.starts_with("screenshot")));
            assert!(!page.calls.iter().any(|c| c.starts_with("outer_html")));
        }
    }

    #[test]
    fn missing_export_control_is_timeout() {
        let mut page = ScriptedPage::new();
        page.absent.push(r#"button[aria-label="Save SVG"]"#);
        let err = render(&mut page, &request(ExportFormat::Vector), &RenderSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Timeout {
                stage: Stage::Export,
                ..
            }
        ));
    }

    #[test]
    fn surface_gone_at_capture() {
        for format in [ExportFormat::Raster, ExportFormat::Vector] {
            let mut page = ScriptedPage::new();
            page.surface_gone_at_capture = true;
            let err = render(&mut page, &request(format), &RenderSettings::default()).unwrap_err();
            assert!(
                matches!(err, RenderError::SurfaceMissing { ref selector } if selector == "#frame"),
                "{format}: {err:?}"
            );
        }
    }

    #[test]
    fn corrupt_screenshot_is_rejected() {
        let mut page = ScriptedPage::new();
        page.screenshot = b"not a png".to_vec();
        let err = render(&mut page, &request(ExportFormat::Raster), &RenderSettings::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::CorruptCapture { .. }));
    }

    #[test]
    fn session_closes_exactly_once() {
        let page = ScriptedPage::new();
        let closes = Arc::clone(&page.closes);
        let mut session = RenderSession::with_page(Box::new(page), RenderSettings::default());
        session.render(&request(ExportFormat::Vector)).unwrap();
        session.close();
        session.close();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_session_still_closes() {
        let page = ScriptedPage::new();
        let closes = Arc::clone(&page.closes);
        {
            let _session = RenderSession::with_page(Box::new(page), RenderSettings::default());
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn render_after_close_fails() {
        let mut session =
            RenderSession::with_page(Box::new(ScriptedPage::new()), RenderSettings::default());
        session.close();
        assert!(session.render(&request(ExportFormat::Raster)).is_err());
    }
}
