//! Batch results: one [`FileResult`] per changed file plus aggregate stats.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a single changed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    /// 0-based position in the changed-file list.
    pub index: usize,
    /// Repository-relative path.
    pub path: String,
    /// Language tag the card was rendered with (empty if fetch failed).
    pub language: String,
    /// Written artifact, `None` on failure.
    pub output: Option<PathBuf>,
    /// Artifact size in bytes.
    pub bytes: usize,
    /// Wall-clock time spent on this file.
    pub duration_ms: u64,
    /// Failure, if any. No artifact exists when this is set.
    pub error: Option<FileError>,
}

impl FileResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters for a finished batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Files in the changed-file list.
    pub total_files: usize,
    /// Files with a written artifact.
    pub succeeded: usize,
    /// Files that failed at any stage.
    pub failed: usize,
    /// Total bytes written.
    pub total_bytes: u64,
    /// Batch wall-clock time, browser start-up included.
    pub total_duration_ms: u64,
}

/// Everything [`crate::batch::generate`] knows about a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub source_revision: String,
    pub target_revision: String,
    pub output_dir: PathBuf,
    /// Per-file results in changed-file order.
    pub files: Vec<FileResult>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// Iterate over the failures only.
    pub fn failures(&self) -> impl Iterator<Item = &FileError> {
        self.files.iter().filter_map(|f| f.error.as_ref())
    }

    /// Iterate over the written artifact paths, in changed-file order.
    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().filter_map(|f| f.output.as_ref())
    }
}
