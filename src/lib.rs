//! # rayso-diff
//!
//! Render every file changed between two git revisions as a code card on
//! [ray.so](https://ray.so), saved as a PNG, an SVG or a shareable link.
//!
//! ## Why this crate?
//!
//! Release notes, code reviews and changelogs read better with the changed
//! code shown as styled cards. ray.so renders those cards client-side from
//! parameters in the URL, so the whole job is browser automation: open the
//! page, wait for the card, drive the export controls, capture the result.
//! This crate does that once per changed file and keeps going when a single
//! file fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! main...HEAD
//!  │
//!  ├─ 1. Diff      changed paths via git2 (merge-base, diff order)
//!  ├─ 2. Fetch     file text at the target revision
//!  ├─ 3. Classify  extension → highlighter language
//!  ├─ 4. Render    navigate, wait for #frame (headless Chrome, spawn_blocking)
//!  ├─ 5. Export    PNG screenshot / SVG markup / clipboard link
//!  └─ 6. Persist   <path_with_underscores>.<ext>, written atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rayso_diff::{generate, BatchConfig, BatchJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let job = BatchJob {
//!         source_revision: "main".into(),
//!         target_revision: "HEAD".into(),
//!         ..Default::default()
//!     };
//!     let report = generate(&job, &BatchConfig::default()).await?;
//!     for failure in report.failures() {
//!         eprintln!("skipped: {}", failure);
//!     }
//!     eprintln!("{}/{} files rendered",
//!         report.stats.succeeded,
//!         report.stats.total_files);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rayso-diff` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! rayso-diff = { version = "0.1", default-features = false }
//! ```
//!
//! ## Export Formats
//!
//! | Format | Artifact | Extension |
//! |--------|----------|-----------|
//! | `png`  | element screenshot at the chosen scale | `.png` |
//! | `svg`  | serialized markup of the render surface | `.svg` |
//! | `url`  | shareable link read from the clipboard | `.url.txt` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{generate, generate_sync, run};
pub use config::{
    BatchConfig, BatchConfigBuilder, BatchJob, ExportFormat, ExportScale, Padding, RenderOptions,
    UnknownExportFormat,
};
pub use error::{FileError, RaysoError, Stage};
pub use output::{BatchReport, BatchStats, FileResult};
pub use pipeline::driver::{ChromeLauncher, ChromeOptions, PageDriver, SessionLauncher};
pub use pipeline::source::{GitRepository, SourceRepository};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
