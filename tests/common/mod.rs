//! Shared fixtures for integration tests: an in-memory revision source, a
//! scripted browser page with fault injection, and a scratch git repository
//! builder.

#![allow(dead_code)]

use git2::{
    Commit, Index, IndexEntry, IndexTime, Oid, Repository, RepositoryInitOptions, Signature, Time,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rayso_diff::pipeline::driver::{DriverError, PageDriver, SessionLauncher, Visibility};
use rayso_diff::pipeline::source::{ContentFetcher, RevisionDiffer, SourceError};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// File content containing this token never gets a render surface.
pub const HANG_SURFACE: &str = "HANGSURFACE";

/// File content containing this token makes the page panic at capture.
pub const PANIC_CAPTURE: &str = "PANICCAPTURE";

// ── In-memory source ─────────────────────────────────────────────────────────

/// Changed-file list plus file content at the target revision.
#[derive(Default)]
pub struct FakeSource {
    pub changed: Vec<String>,
    pub files: HashMap<String, String>,
    pub diff_fails: bool,
}

impl FakeSource {
    pub fn new(changed: &[&str], files: &[(&str, &str)]) -> Self {
        Self {
            changed: changed.iter().map(|s| s.to_string()).collect(),
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            diff_fails: false,
        }
    }
}

impl RevisionDiffer for FakeSource {
    fn changed_files(&self, _source: &str, _target: &str) -> Result<Vec<String>, SourceError> {
        if self.diff_fails {
            return Err(SourceError::Git(git2::Error::from_str("bad revision")));
        }
        Ok(self.changed.clone())
    }
}

impl ContentFetcher for FakeSource {
    fn file_content(&self, revision: &str, path: &str) -> Result<String, SourceError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                revision: revision.to_string(),
                path: path.to_string(),
            })
    }
}

// ── Scripted browser ─────────────────────────────────────────────────────────

/// What the clipboard read returns on a scripted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clipboard {
    /// The navigated URL.
    Url,
    /// The read throws.
    Denied,
    /// The read resolves to a non-string.
    Null,
}

/// Counts launches and closes across every page a launcher hands out.
#[derive(Clone)]
pub struct FakeLauncher {
    pub clipboard: Clipboard,
    pub fail_launch: bool,
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    /// Every URL navigated to, across all pages, in call order.
    pub navigations: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            clipboard: Clipboard::Url,
            fail_launch: false,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            navigations: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl SessionLauncher for FakeLauncher {
    fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        if self.fail_launch {
            return Err(DriverError::Launch("no chrome in test".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            url: String::new(),
            launcher: self.clone(),
        }))
    }
}

struct FakePage {
    url: String,
    launcher: FakeLauncher,
}

impl PageDriver for FakePage {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.url = url.to_string();
        if let Ok(mut log) = self.launcher.navigations.lock() {
            log.push(url.to_string());
        }
        Ok(())
    }

    fn wait_for(
        &mut self,
        selector: &str,
        _visibility: Visibility,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        if selector == "#frame" && self.url.contains(HANG_SURFACE) {
            return Err(DriverError::Timeout {
                what: selector.to_string(),
                after: timeout,
            });
        }
        Ok(())
    }

    fn click(&mut self, _selector: &str) -> Result<(), DriverError> {
        Ok(())
    }

    fn evaluate(&mut self, _expression: &str) -> Result<serde_json::Value, DriverError> {
        match self.launcher.clipboard {
            Clipboard::Url => Ok(serde_json::Value::String(self.url.clone())),
            Clipboard::Denied => Err(DriverError::Protocol("NotAllowedError".into())),
            Clipboard::Null => Ok(serde_json::Value::Null),
        }
    }

    fn outer_html(&mut self, _selector: &str) -> Result<Option<String>, DriverError> {
        if self.url.contains(PANIC_CAPTURE) {
            panic!("driver bug");
        }
        Ok(Some(format!("<svg data-src=\"{}\"></svg>", self.url)))
    }

    fn screenshot_element(&mut self, _selector: &str) -> Result<Option<Vec<u8>>, DriverError> {
        if self.url.contains(PANIC_CAPTURE) {
            panic!("driver bug");
        }
        Ok(Some(card_png(self.url.len())))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.launcher.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Deterministic PNG whose width depends on `seed`.
pub fn card_png(seed: usize) -> Vec<u8> {
    let width = 8 + (seed % 32) as u32;
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, 6, Rgba([30, 30, 46, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// Sorted file names in `dir`.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read output dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Scratch git repository ───────────────────────────────────────────────────

/// A file change in a scratch commit: `Some(bytes)` writes, `None` deletes.
pub type Change<'a> = (&'a str, Option<&'a [u8]>);

pub fn put<'a>(path: &'a str, bytes: &'a [u8]) -> Change<'a> {
    (path, Some(bytes))
}

pub fn delete(path: &str) -> Change<'_> {
    (path, None)
}

pub fn init_repo(dir: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(dir, &opts).expect("init repo")
}

/// Commit `changes` on top of `parent` and move `reference` to the result.
pub fn commit(
    repo: &Repository,
    reference: &str,
    parent: Option<&Commit<'_>>,
    changes: &[Change<'_>],
    message: &str,
) -> Oid {
    let mut index = Index::new().expect("in-memory index");
    if let Some(parent) = parent {
        index
            .read_tree(&parent.tree().expect("parent tree"))
            .expect("read parent tree");
    }

    for (path, content) in changes {
        match content {
            Some(bytes) => {
                let blob = repo.blob(bytes).expect("write blob");
                index
                    .add(&IndexEntry {
                        ctime: IndexTime::new(0, 0),
                        mtime: IndexTime::new(0, 0),
                        dev: 0,
                        ino: 0,
                        mode: 0o100644,
                        uid: 0,
                        gid: 0,
                        file_size: bytes.len() as u32,
                        id: blob,
                        flags: 0,
                        flags_extended: 0,
                        path: path.as_bytes().to_vec(),
                    })
                    .expect("stage file");
            }
            None => index.remove_path(Path::new(path)).expect("unstage file"),
        }
    }

    let tree_id = index.write_tree_to(repo).expect("write tree");
    let tree = repo.find_tree(tree_id).expect("find tree");
    let sig = Signature::new("Test", "test@example.com", &Time::new(1_700_000_000, 0))
        .expect("signature");
    let parents: Vec<&Commit<'_>> = parent.into_iter().collect();
    repo.commit(Some(reference), &sig, &sig, message, &tree, &parents)
        .expect("commit")
}
