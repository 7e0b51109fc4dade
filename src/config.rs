//! Configuration types for a render batch.
//!
//! Three structs split the knobs by lifetime:
//!
//! * [`RenderOptions`]: the card template (theme, padding, format, …) shared
//!   by every file of the batch. Per-file title, language and source text are
//!   filled in later by [`crate::pipeline::request::RenderRequest::for_file`].
//! * [`BatchJob`]: *what* to render: repository, revision pair, output
//!   directory and the template.
//! * [`BatchConfig`]: *how* to render: endpoint, timeouts, worker count,
//!   browser window. Built via [`BatchConfig::builder()`].
//!
//! Every field carries its default here, so nothing downstream ever has to
//! branch on "option absent".

use crate::error::RaysoError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default rendering endpoint.
pub const DEFAULT_BASE_URL: &str = "https://ray.so/";

/// Element id of the rendered code card.
pub const DEFAULT_SURFACE_SELECTOR: &str = "#frame";

// ── Enums ────────────────────────────────────────────────────────────────

/// Which export path the render session drives.
///
/// | Variant  | CLI names        | Artifact            |
/// |----------|------------------|---------------------|
/// | `Raster` | `png`, `raster`  | element screenshot  |
/// | `Vector` | `svg`, `vector`  | serialized markup   |
/// | `Link`   | `url`, `link`    | shareable URL text  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Raster,
    Vector,
    Link,
}

impl ExportFormat {
    /// File extension of the persisted artifact (without the leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Raster => "png",
            ExportFormat::Vector => "svg",
            ExportFormat::Link => "url.txt",
        }
    }

    /// Whether the scale selector applies to this format.
    pub fn supports_scale(&self) -> bool {
        !matches!(self, ExportFormat::Link)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Raster => "png",
            ExportFormat::Vector => "svg",
            ExportFormat::Link => "url",
        })
    }
}

/// Returned when an export format name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown export format '{0}' (expected png, svg or url)")]
pub struct UnknownExportFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownExportFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" | "raster" => Ok(ExportFormat::Raster),
            "svg" | "vector" => Ok(ExportFormat::Vector),
            "url" | "link" => Ok(ExportFormat::Link),
            other => Err(UnknownExportFormat(other.to_string())),
        }
    }
}

/// Export scale offered by the service's size selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportScale {
    #[serde(rename = "2x")]
    X2,
    #[default]
    #[serde(rename = "4x")]
    X4,
    #[serde(rename = "6x")]
    X6,
}

impl ExportScale {
    /// The `data-size` attribute value of the matching control.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportScale::X2 => "2x",
            ExportScale::X4 => "4x",
            ExportScale::X6 => "6x",
        }
    }
}

impl fmt::Display for ExportScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "2x" => Ok(ExportScale::X2),
            "4x" => Ok(ExportScale::X4),
            "6x" => Ok(ExportScale::X6),
            other => Err(format!("unknown size '{other}' (expected 2x, 4x or 6x)")),
        }
    }
}

/// Card padding: one of the service presets or a raw pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Padding {
    Sm,
    #[default]
    Md,
    Lg,
    Xl,
    Custom(u32),
}

impl Padding {
    /// Padding in CSS pixels, as sent to the service.
    pub fn pixels(&self) -> u32 {
        match self {
            Padding::Sm => 16,
            Padding::Md => 32,
            Padding::Lg => 64,
            Padding::Xl => 128,
            Padding::Custom(px) => *px,
        }
    }

    /// Lenient parse: presets, then the leading digits (`"48px"` is 48);
    /// anything else is `Md` (32 px).
    pub fn parse(s: &str) -> Padding {
        match s.trim().to_lowercase().as_str() {
            "sm" => Padding::Sm,
            "md" => Padding::Md,
            "lg" => Padding::Lg,
            "xl" => Padding::Xl,
            other => {
                let digits = other
                    .find(|c: char| !c.is_ascii_digit())
                    .map_or(other, |end| &other[..end]);
                digits.parse::<u32>().map(Padding::Custom).unwrap_or(Padding::Md)
            }
        }
    }
}

// ── Render template ──────────────────────────────────────────────────────

/// The per-batch card template.
///
/// `title` and `language` are overrides: when `None` each file gets its own
/// path as title and the classifier's tag as language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Title shown on every card. Default: the file's path.
    pub title: Option<String>,
    /// Service theme name. Default: `candy`.
    pub theme: String,
    /// Card padding. Default: 32 px.
    pub padding: Padding,
    /// Forced language tag. Default: classified from the extension.
    pub language: Option<String>,
    /// Draw the themed background. Default: true.
    pub background: bool,
    /// Dark variant of the theme. Default: true.
    pub dark_mode: bool,
    /// Export path. Default: raster.
    pub format: ExportFormat,
    /// Export scale. Default: 4x.
    pub scale: ExportScale,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            title: None,
            theme: "candy".to_string(),
            padding: Padding::default(),
            language: None,
            background: true,
            dark_mode: true,
            format: ExportFormat::default(),
            scale: ExportScale::default(),
        }
    }
}

// ── Batch job ────────────────────────────────────────────────────────────

/// What a batch renders. Created once and never mutated while running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    /// Repository root (or any path inside it).
    pub repository: PathBuf,
    /// Base side of the diff. Default: `main`.
    pub source_revision: String,
    /// Side whose content is rendered. Default: `HEAD`.
    pub target_revision: String,
    /// Artifact destination. Default: `./rayso_images`.
    pub output_dir: PathBuf,
    /// Card template.
    pub template: RenderOptions,
}

impl Default for BatchJob {
    fn default() -> Self {
        Self {
            repository: PathBuf::from("."),
            source_revision: "main".to_string(),
            target_revision: "HEAD".to_string(),
            output_dir: PathBuf::from("./rayso_images"),
            template: RenderOptions::default(),
        }
    }
}

// ── Batch config ─────────────────────────────────────────────────────────

/// How a batch talks to the browser and the rendering service.
#[derive(Clone)]
pub struct BatchConfig {
    /// Rendering page; the encoded card parameters are appended as a fragment.
    pub base_url: String,

    /// CSS selector of the render surface. Default: `#frame`.
    pub surface_selector: String,

    /// Bound on page load + network settle, in seconds. Default: 30.
    pub navigation_timeout_secs: u64,

    /// Bound on the render surface appearing, in seconds. Default: 10.
    pub surface_timeout_secs: u64,

    /// Bound on each export/scale control becoming visible, in seconds. Default: 10.
    pub control_timeout_secs: u64,

    /// Queue consumers, each owning one browser and one page. Default: 1.
    ///
    /// A page is single-occupancy; more workers means more browsers, never
    /// two files on one page.
    pub workers: usize,

    /// Run the browser without a window. Default: true.
    pub headless: bool,

    /// Browser window size in pixels. Default: 1920×1080.
    pub window_size: (u32, u32),

    /// Browser is killed after this long without protocol traffic. Default: 120.
    pub idle_browser_timeout_secs: u64,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            surface_selector: DEFAULT_SURFACE_SELECTOR.to_string(),
            navigation_timeout_secs: 30,
            surface_timeout_secs: 10,
            control_timeout_secs: 10,
            workers: 1,
            headless: true,
            window_size: (1920, 1080),
            idle_browser_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("base_url", &self.base_url)
            .field("surface_selector", &self.surface_selector)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("surface_timeout_secs", &self.surface_timeout_secs)
            .field("control_timeout_secs", &self.control_timeout_secs)
            .field("workers", &self.workers)
            .field("headless", &self.headless)
            .field("window_size", &self.window_size)
            .field("idle_browser_timeout_secs", &self.idle_browser_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn surface_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.surface_selector = selector.into();
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    pub fn surface_timeout_secs(mut self, secs: u64) -> Self {
        self.config.surface_timeout_secs = secs;
        self
    }

    pub fn control_timeout_secs(mut self, secs: u64) -> Self {
        self.config.control_timeout_secs = secs;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.config.window_size = (width, height);
        self
    }

    pub fn idle_browser_timeout_secs(mut self, secs: u64) -> Self {
        self.config.idle_browser_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, RaysoError> {
        let c = &self.config;
        if c.base_url.trim().is_empty() {
            return Err(RaysoError::InvalidConfig("base URL must not be empty".into()));
        }
        if c.surface_selector.trim().is_empty() {
            return Err(RaysoError::InvalidConfig(
                "surface selector must not be empty".into(),
            ));
        }
        if c.navigation_timeout_secs == 0
            || c.surface_timeout_secs == 0
            || c.control_timeout_secs == 0
        {
            return Err(RaysoError::InvalidConfig(
                "timeouts must be at least 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
