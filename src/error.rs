//! Error types for the rayso-diff library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RaysoError`]: **Fatal**: the batch cannot proceed at all (output
//!   directory cannot be created, browser cannot be launched). Returned as
//!   `Err(RaysoError)` from the top-level `generate*` functions.
//!
//! * [`FileError`]: **Non-fatal**: a single changed file failed (missing at
//!   the target revision, render surface never appeared, export control
//!   timed out) but every other file is unaffected. Stored inside
//!   [`crate::output::FileResult`] so callers can inspect partial success
//!   rather than losing the whole batch to one bad file.
//!
//! Lower layers use their own narrow errors ([`crate::pipeline::driver::DriverError`],
//! [`crate::pipeline::render::RenderError`]); they are mapped to a
//! [`FileError`] at the file boundary where the path is known.

use crate::pipeline::render::RenderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the rayso-diff library.
///
/// File-level failures use [`FileError`] and are stored in
/// [`crate::output::FileResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum RaysoError {
    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Browser errors ────────────────────────────────────────────────────
    /// The browser process or its page could not be started.
    #[error(
        "Failed to launch browser: {detail}\n\
Make sure Chrome or Chromium is installed, or set CHROME=/path/to/chrome."
    )]
    BrowserLaunch { detail: String },

    // ── Repository errors ─────────────────────────────────────────────────
    /// The repository location is not a git repository.
    #[error("Cannot open git repository at '{path}': {detail}")]
    Repository { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The step of the per-file pipeline an error or log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the file at the target revision.
    Fetch,
    /// Loading the render page and waiting for the network to settle.
    Navigate,
    /// Waiting for the render surface to exist.
    Surface,
    /// Driving the format-specific export controls.
    Export,
    /// Selecting the export scale.
    Scale,
    /// Screenshot, markup read or clipboard read.
    Capture,
    /// Writing the artifact to disk.
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Navigate => "navigate",
            Stage::Surface => "surface",
            Stage::Export => "export",
            Stage::Scale => "scale",
            Stage::Capture => "capture",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single changed file.
///
/// Stored alongside [`crate::output::FileResult`] when a file fails.
/// The batch always continues with the next file.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum FileError {
    /// The file could not be read at the target revision (deleted, binary, …).
    #[error("{path}: cannot read at revision '{revision}': {detail}")]
    ContentFetch {
        path: String,
        revision: String,
        detail: String,
    },

    /// A bounded wait (navigation, render surface, export control) expired.
    #[error("{path}: timed out after {secs}s during {stage} waiting for {waited_for}")]
    RenderTimeout {
        path: String,
        stage: Stage,
        waited_for: String,
        secs: u64,
    },

    /// The render surface vanished between the existence wait and capture.
    #[error("{path}: render surface '{selector}' disappeared before capture")]
    RenderSurfaceMissing { path: String, selector: String },

    /// The browser reported a protocol or script error.
    #[error("{path}: browser error during {stage}: {detail}")]
    Browser {
        path: String,
        stage: Stage,
        detail: String,
    },

    /// The captured raster bytes are not a decodable image.
    #[error("{path}: captured image is corrupt: {detail}")]
    CorruptCapture { path: String, detail: String },

    /// The artifact could not be written.
    #[error("{path}: failed to write '{output}': {detail}")]
    WriteFailed {
        path: String,
        output: PathBuf,
        detail: String,
    },
}

impl FileError {
    /// Attach the changed-file path to a render failure.
    pub fn from_render(path: &str, err: RenderError) -> Self {
        let path = path.to_string();
        match err {
            RenderError::Timeout {
                stage,
                waited_for,
                secs,
            } => FileError::RenderTimeout {
                path,
                stage,
                waited_for,
                secs,
            },
            RenderError::SurfaceMissing { selector } => {
                FileError::RenderSurfaceMissing { path, selector }
            }
            RenderError::Browser { stage, detail } => FileError::Browser {
                path,
                stage,
                detail,
            },
            RenderError::CorruptCapture { detail } => FileError::CorruptCapture { path, detail },
        }
    }

    /// The changed-file path this error belongs to.
    pub fn path(&self) -> &str {
        match self {
            FileError::ContentFetch { path, .. }
            | FileError::RenderTimeout { path, .. }
            | FileError::RenderSurfaceMissing { path, .. }
            | FileError::Browser { path, .. }
            | FileError::CorruptCapture { path, .. }
            | FileError::WriteFailed { path, .. } => path,
        }
    }

    /// The pipeline stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            FileError::ContentFetch { .. } => Stage::Fetch,
            FileError::RenderTimeout { stage, .. } | FileError::Browser { stage, .. } => *stage,
            FileError::RenderSurfaceMissing { .. } | FileError::CorruptCapture { .. } => {
                Stage::Capture
            }
            FileError::WriteFailed { .. } => Stage::Persist,
        }
    }
}
