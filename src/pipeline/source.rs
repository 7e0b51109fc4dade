//! Revision access: the changed-file list and file content at a revision.
//!
//! The orchestrator only sees the two narrow traits below, so tests can
//! substitute an in-memory source and the git backend stays in one place.
//! [`GitRepository`] implements both with `git2`; no `git` executable is
//! spawned.

use crate::error::RaysoError;
use git2::{Commit, DiffFindOptions, ErrorCode, Repository};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading from the repository.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("git: {0}")]
    Git(#[from] git2::Error),

    #[error("'{path}' does not exist at revision '{revision}'")]
    NotFound { revision: String, path: String },

    #[error("'{path}' is binary")]
    Binary { path: String },

    #[error("repository lock poisoned")]
    Poisoned,
}

/// Produces the ordered list of paths changed between two revisions.
pub trait RevisionDiffer: Send + Sync {
    fn changed_files(&self, source: &str, target: &str) -> Result<Vec<String>, SourceError>;
}

/// Returns the text of a path at a revision.
pub trait ContentFetcher: Send + Sync {
    fn file_content(&self, revision: &str, path: &str) -> Result<String, SourceError>;
}

/// Both halves of a revision source.
pub trait SourceRepository: RevisionDiffer + ContentFetcher {}

impl<T: RevisionDiffer + ContentFetcher> SourceRepository for T {}

/// A git repository opened through libgit2.
pub struct GitRepository {
    root: PathBuf,
    repo: Mutex<Repository>,
}

impl GitRepository {
    /// Open the repository containing `path` (searches parent directories).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RaysoError> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|e| RaysoError::Repository {
            path: path.to_path_buf(),
            detail: e.message().to_string(),
        })?;
        let root = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();
        debug!("Opened repository at {}", root.display());
        Ok(Self {
            root,
            repo: Mutex::new(repo),
        })
    }

    /// Working-tree root (or the git dir for bare repositories).
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn resolve_commit<'r>(repo: &'r Repository, revision: &str) -> Result<Commit<'r>, git2::Error> {
    repo.revparse_single(revision)?.peel_to_commit()
}

impl RevisionDiffer for GitRepository {
    /// Same file set as `git diff --name-only source...target`: the diff runs
    /// from the merge base of the two revisions to `target`, renames are
    /// listed once under their new path, and paths come back sorted.
    fn changed_files(&self, source: &str, target: &str) -> Result<Vec<String>, SourceError> {
        let repo = self.repo.lock().map_err(|_| SourceError::Poisoned)?;

        let source_commit = resolve_commit(&repo, source)?;
        let target_commit = resolve_commit(&repo, target)?;
        let base = repo.merge_base(source_commit.id(), target_commit.id())?;
        let base_tree = repo.find_commit(base)?.tree()?;
        let target_tree = target_commit.tree()?;

        let mut diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&target_tree), None)?;
        // Fold delete+add pairs into renames so a moved file is listed once.
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;
        let mut files: Vec<String> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .filter(|p| !p.is_empty())
            .collect();
        files.sort();
        files.dedup();

        debug!(
            "{}...{}: {} changed files (merge base {})",
            source,
            target,
            files.len(),
            base
        );
        Ok(files)
    }
}

impl ContentFetcher for GitRepository {
    fn file_content(&self, revision: &str, path: &str) -> Result<String, SourceError> {
        let repo = self.repo.lock().map_err(|_| SourceError::Poisoned)?;

        let spec = format!("{revision}:{path}");
        let object = repo.revparse_single(&spec).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                SourceError::NotFound {
                    revision: revision.to_string(),
                    path: path.to_string(),
                }
            } else {
                SourceError::Git(e)
            }
        })?;
        let blob = object.peel_to_blob()?;

        if blob.is_binary() {
            return Err(SourceError::Binary {
                path: path.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }
}
