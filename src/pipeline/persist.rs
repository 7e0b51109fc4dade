//! Artifact naming and writing.
//!
//! Names are a pure function of `(path, format)`: path separators become
//! underscores and the format's extension is appended, so `a/b.js` rendered
//! as PNG lands at `a_b.js.png`.
//!
//! Writes go through a temp file in the output directory and are renamed into
//! place, so a failure never leaves a truncated artifact behind.

use crate::config::ExportFormat;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Flattened artifact file name for a repository path.
pub fn output_file_name(path: &str, format: ExportFormat) -> String {
    let flat: String = path
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}.{}", flat, format.extension())
}

/// Atomically write `bytes` to `dir/name`, replacing any previous artifact.
pub fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let target = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;
    debug!("Wrote {} ({} bytes)", target.display(), bytes.len());
    Ok(target)
}
