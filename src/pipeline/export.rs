//! Export paths: raster, vector and link.
//!
//! Each format drives a different sequence of UI controls and captures a
//! different artifact. The selectors are the only contract with the remote
//! page, so each variant keeps its own and the render loop dispatches once
//! through [`exporter_for`].
//!
//! | Format | Controls                                   | Capture                     |
//! |--------|--------------------------------------------|-----------------------------|
//! | raster | Save PNG → scale                           | element screenshot (PNG)    |
//! | vector | other options → Save SVG → scale           | surface outer markup        |
//! | link   | other options → Copy URL                   | clipboard text              |

use crate::config::{ExportFormat, ExportScale};
use crate::error::Stage;
use crate::pipeline::driver::{PageDriver, Visibility};
use crate::pipeline::render::RenderError;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

const SAVE_PNG: &str = r#"button[aria-label="Save PNG"]"#;
const OTHER_OPTIONS: &str = r#"button[aria-label="See other export options"]"#;
const SAVE_SVG: &str = r#"button[aria-label="Save SVG"]"#;
const COPY_URL: &str = r#"button[aria-label="Copy URL"]"#;

/// Reads the clipboard inside the page; resolves to '' when access is denied.
const READ_CLIPBOARD: &str = "(async () => { \
    try { return await navigator.clipboard.readText(); } \
    catch (err) { return ''; } })()";

/// Per-request inputs an exporter needs besides the page.
#[derive(Debug, Clone, Copy)]
pub struct ExportContext<'a> {
    pub surface_selector: &'a str,
    pub scale: ExportScale,
    pub control_timeout: Duration,
}

/// One export path. Runs after the render surface exists.
pub trait Exporter: Sync {
    fn format(&self) -> ExportFormat;

    /// Drive the export controls and capture the artifact bytes.
    fn export(
        &self,
        page: &mut dyn PageDriver,
        ctx: &ExportContext<'_>,
    ) -> Result<Vec<u8>, RenderError>;
}

/// The exporter for `format`.
pub fn exporter_for(format: ExportFormat) -> &'static dyn Exporter {
    match format {
        ExportFormat::Raster => &RasterExporter,
        ExportFormat::Vector => &VectorExporter,
        ExportFormat::Link => &LinkExporter,
    }
}

// ── Shared steps ─────────────────────────────────────────────────────────

/// Wait for a control to become visible, then click it.
fn activate(
    page: &mut dyn PageDriver,
    selector: &str,
    stage: Stage,
    timeout: Duration,
) -> Result<(), RenderError> {
    page.wait_for(selector, Visibility::Visible, timeout)
        .map_err(|e| RenderError::from_driver(stage, e))?;
    page.click(selector)
        .map_err(|e| RenderError::from_driver(stage, e))?;
    debug!("Clicked {}", selector);
    Ok(())
}

fn scale_selector(scale: ExportScale) -> String {
    format!(r#"button[data-size="{}"]"#, scale.as_str())
}

fn select_scale(page: &mut dyn PageDriver, ctx: &ExportContext<'_>) -> Result<(), RenderError> {
    activate(
        page,
        &scale_selector(ctx.scale),
        Stage::Scale,
        ctx.control_timeout,
    )
}

// ── Raster ───────────────────────────────────────────────────────────────

/// Pixel screenshot of the render surface.
pub struct RasterExporter;

impl Exporter for RasterExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Raster
    }

    fn export(
        &self,
        page: &mut dyn PageDriver,
        ctx: &ExportContext<'_>,
    ) -> Result<Vec<u8>, RenderError> {
        activate(page, SAVE_PNG, Stage::Export, ctx.control_timeout)?;
        select_scale(page, ctx)?;

        let bytes = page
            .screenshot_element(ctx.surface_selector)
            .map_err(|e| RenderError::from_driver(Stage::Capture, e))?
            .ok_or_else(|| RenderError::SurfaceMissing {
                selector: ctx.surface_selector.to_string(),
            })?;

        let (width, height) = ImageReader::with_format(Cursor::new(&bytes), ImageFormat::Png)
            .into_dimensions()
            .map_err(|e| RenderError::CorruptCapture {
                detail: e.to_string(),
            })?;
        debug!("Captured {}x{} px ({} bytes)", width, height, bytes.len());
        Ok(bytes)
    }
}

// ── Vector ───────────────────────────────────────────────────────────────

/// Serialized markup of the render surface.
pub struct VectorExporter;

impl Exporter for VectorExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Vector
    }

    fn export(
        &self,
        page: &mut dyn PageDriver,
        ctx: &ExportContext<'_>,
    ) -> Result<Vec<u8>, RenderError> {
        activate(page, OTHER_OPTIONS, Stage::Export, ctx.control_timeout)?;
        activate(page, SAVE_SVG, Stage::Export, ctx.control_timeout)?;
        select_scale(page, ctx)?;

        let markup = page
            .outer_html(ctx.surface_selector)
            .map_err(|e| RenderError::from_driver(Stage::Capture, e))?
            .ok_or_else(|| RenderError::SurfaceMissing {
                selector: ctx.surface_selector.to_string(),
            })?;
        Ok(markup.into_bytes())
    }
}

// ── Link ─────────────────────────────────────────────────────────────────

/// Shareable URL copied to the clipboard by the page.
pub struct LinkExporter;

impl Exporter for LinkExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Link
    }

    fn export(
        &self,
        page: &mut dyn PageDriver,
        ctx: &ExportContext<'_>,
    ) -> Result<Vec<u8>, RenderError> {
        activate(page, OTHER_OPTIONS, Stage::Export, ctx.control_timeout)?;
        activate(page, COPY_URL, Stage::Export, ctx.control_timeout)?;

        let link = match page.evaluate(READ_CLIPBOARD) {
            Ok(serde_json::Value::String(s)) => s,
            Ok(other) => {
                warn!("Clipboard unavailable: read returned {}", other);
                String::new()
            }
            Err(e) => {
                warn!("Clipboard unavailable: {}", e);
                String::new()
            }
        };
        if link.is_empty() {
            warn!("Clipboard was empty after Copy URL; writing an empty link");
        }
        Ok(link.into_bytes())
    }
}
