//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the changed-file list.
//!
//! # Example
//!
//! ```rust
//! use rayso_diff::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, path: &str, bytes: usize) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} ({} bytes)", index + 1, total, path, bytes);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each changed file.
///
/// Implementations must be `Send + Sync`: with more than one worker the
/// per-file methods are called from several threads. All methods default to
/// no-ops so callers only override what they care about.
///
/// `index` is the 0-based position of the file in the changed-file list.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the changed-file list is known.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before the file's content is fetched.
    fn on_file_start(&self, index: usize, total_files: usize, path: &str) {
        let _ = (index, total_files, path);
    }

    /// Called after the artifact is written.
    fn on_file_complete(&self, index: usize, total_files: usize, path: &str, bytes: usize) {
        let _ = (index, total_files, path, bytes);
    }

    /// Called when the file fails at any stage.
    fn on_file_error(&self, index: usize, total_files: usize, path: &str, error: &str) {
        let _ = (index, total_files, path, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
