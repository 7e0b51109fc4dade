//! Batch entry points: a revision pair in, one artifact per changed file out.
//!
//! ## Flow
//!
//! ```text
//! create output dir ──▶ changed files ──▶ queue ──▶ worker(s) ──▶ report
//!   (only fatal step)     (diff order)              one browser page each
//! ```
//!
//! The changed-file list is pushed onto a queue in diff order and consumed by
//! `config.workers` workers. Each worker runs on a `spawn_blocking` thread
//! and owns exactly one [`RenderSession`] for its whole life, so a page is
//! never shared between two files in flight. With the default single worker
//! files are processed strictly one at a time, in diff order.
//!
//! Per-file failures are recorded on the [`FileResult`] and never abort the
//! batch. A panic while rendering one file is caught, recorded against that
//! file, and the worker carries on with a freshly launched session. Sessions
//! are closed on every exit path.

use crate::config::{BatchConfig, BatchJob, RenderOptions};
use crate::error::{FileError, RaysoError, Stage};
use crate::output::{BatchReport, BatchStats, FileResult};
use crate::pipeline::driver::{ChromeLauncher, ChromeOptions, SessionLauncher};
use crate::pipeline::language::classify;
use crate::pipeline::persist::{output_file_name, write_artifact};
use crate::pipeline::render::{RenderSession, RenderSettings};
use crate::pipeline::request::RenderRequest;
use crate::pipeline::source::{GitRepository, SourceRepository};
use crate::progress::ProgressCallback;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Render every file changed between the job's revisions.
///
/// Opens the repository with `git2` and renders through a local Chrome.
///
/// # Returns
/// `Ok(BatchReport)` whenever the batch ran, even if some files failed
/// (check `report.stats.failed`).
///
/// # Errors
/// Returns `Err(RaysoError)` only for fatal errors:
/// - Repository cannot be opened
/// - Output directory cannot be created
/// - No browser could be launched
pub async fn generate(job: &BatchJob, config: &BatchConfig) -> Result<BatchReport, RaysoError> {
    let path = job.repository.clone();
    let repo = tokio::task::spawn_blocking(move || GitRepository::open(path))
        .await
        .map_err(|e| RaysoError::Internal(format!("repository task panicked: {e}")))??;
    debug!("Repository root: {}", repo.root().display());

    let launcher = ChromeLauncher::new(chrome_options(config));
    run(job, config, Arc::new(repo), Arc::new(launcher)).await
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(job: &BatchJob, config: &BatchConfig) -> Result<BatchReport, RaysoError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RaysoError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(job, config))
}

/// Run a batch against any revision source and browser launcher.
///
/// [`generate`] is this with the git and Chrome backends plugged in.
pub async fn run(
    job: &BatchJob,
    config: &BatchConfig,
    source: Arc<dyn SourceRepository>,
    launcher: Arc<dyn SessionLauncher>,
) -> Result<BatchReport, RaysoError> {
    let started = Instant::now();
    info!(
        "Starting batch: {}...{} -> {}",
        job.source_revision,
        job.target_revision,
        job.output_dir.display()
    );

    // ── Step 1: Output directory ─────────────────────────────────────────
    tokio::fs::create_dir_all(&job.output_dir)
        .await
        .map_err(|e| RaysoError::OutputDirectory {
            path: job.output_dir.clone(),
            source: e,
        })?;

    // ── Step 2: Changed files ────────────────────────────────────────────
    let files = {
        let source = Arc::clone(&source);
        let from = job.source_revision.clone();
        let to = job.target_revision.clone();
        let listed = tokio::task::spawn_blocking(move || source.changed_files(&from, &to))
            .await
            .map_err(|e| RaysoError::Internal(format!("diff task panicked: {e}")))?;
        match listed {
            Ok(files) => files,
            Err(e) => {
                error!(
                    source_revision = %job.source_revision,
                    target_revision = %job.target_revision,
                    "Could not list changed files: {}",
                    e
                );
                Vec::new()
            }
        }
    };
    let total = files.len();
    info!("{} changed files", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    if files.is_empty() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(0, 0);
        }
        return Ok(assemble_report(job, Vec::new(), started));
    }

    // ── Step 3: Queue ────────────────────────────────────────────────────
    let (tx, rx) = mpsc::unbounded_channel();
    for entry in files.into_iter().enumerate() {
        tx.send(entry)
            .map_err(|_| RaysoError::Internal("work queue closed early".into()))?;
    }
    drop(tx);
    let queue = Arc::new(Mutex::new(rx));

    // ── Step 4: Workers ──────────────────────────────────────────────────
    let ctx = Arc::new(WorkerContext {
        source,
        launcher,
        settings: RenderSettings::from(config),
        template: job.template.clone(),
        target_revision: job.target_revision.clone(),
        output_dir: job.output_dir.clone(),
        total,
        progress: config.progress_callback.clone(),
    });
    let workers = config.workers.clamp(1, total);
    debug!("Spawning {} render worker(s)", workers);

    let handles = (0..workers).map(|id| {
        let ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&queue);
        tokio::task::spawn_blocking(move || run_worker(id, &ctx, &queue))
    });
    let joined = futures::future::join_all(handles).await;

    let mut results = Vec::with_capacity(total);
    let mut launch_failure = None;
    let mut launched = 0usize;
    for outcome in joined {
        match outcome {
            Ok(Ok(mut batch)) => {
                launched += 1;
                results.append(&mut batch);
            }
            Ok(Err(e)) => {
                launch_failure.get_or_insert(e);
            }
            Err(e) => {
                return Err(RaysoError::Internal(format!("render worker panicked: {e}")));
            }
        }
    }
    if launched == 0 {
        return Err(launch_failure
            .unwrap_or_else(|| RaysoError::Internal("no render worker started".into())));
    }
    if let Some(e) = launch_failure {
        warn!("Some render workers did not start: {}", e);
    }

    // ── Step 5: Report ───────────────────────────────────────────────────
    results.sort_by_key(|r| r.index);
    let report = assemble_report(job, results, started);

    info!(
        "Batch complete: {}/{} files, {}ms total",
        report.stats.succeeded, report.stats.total_files, report.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(report.stats.total_files, report.stats.succeeded);
    }
    Ok(report)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Shared, read-only state for every worker in a batch.
struct WorkerContext {
    source: Arc<dyn SourceRepository>,
    launcher: Arc<dyn SessionLauncher>,
    settings: RenderSettings,
    template: RenderOptions,
    target_revision: String,
    output_dir: PathBuf,
    total: usize,
    progress: Option<ProgressCallback>,
}

type WorkQueue = Mutex<mpsc::UnboundedReceiver<(usize, String)>>;

/// Drain the queue on one browser page. Runs on a blocking thread.
fn run_worker(
    id: usize,
    ctx: &WorkerContext,
    queue: &WorkQueue,
) -> Result<Vec<FileResult>, RaysoError> {
    let session = RenderSession::open(ctx.launcher.as_ref(), ctx.settings.clone())
        .map_err(|e| RaysoError::BrowserLaunch {
            detail: e.to_string(),
        })?;
    let mut session = Some(session);
    debug!(worker = id, "Render session ready");

    let mut results = Vec::new();
    loop {
        let next = queue.blocking_lock().blocking_recv();
        let Some((index, path)) = next else {
            break;
        };
        let Some(active) = session.as_mut() else {
            let e = FileError::Browser {
                path: path.clone(),
                stage: Stage::Navigate,
                detail: "no browser session available".into(),
            };
            results.push(failed_file(ctx, index, &path, e));
            continue;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            process_file(ctx, active, index, &path)
        }));
        match outcome {
            Ok(result) => results.push(result),
            Err(payload) => {
                let detail = format!("render panicked: {}", panic_message(&*payload));
                let e = FileError::Browser {
                    path: path.clone(),
                    stage: Stage::Capture,
                    detail,
                };
                results.push(failed_file(ctx, index, &path, e));
                // The page may be mid-protocol; start the next file on a fresh one.
                session = reopen_session(id, ctx, session.take());
            }
        }
    }

    if let Some(mut session) = session {
        session.close();
    }
    debug!(worker = id, files = results.len(), "Render worker finished");
    Ok(results)
}

/// Fetch, classify, render and persist one file. Never fails the batch.
fn process_file(
    ctx: &WorkerContext,
    session: &mut RenderSession,
    index: usize,
    path: &str,
) -> FileResult {
    let started = Instant::now();
    if let Some(ref cb) = ctx.progress {
        cb.on_file_start(index, ctx.total, path);
    }

    let mut language = String::new();
    let outcome = render_file(ctx, session, path, &mut language);
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok((output, bytes)) => {
            info!("Wrote {} ({} bytes, {}ms)", output.display(), bytes, duration_ms);
            if let Some(ref cb) = ctx.progress {
                cb.on_file_complete(index, ctx.total, path, bytes);
            }
            FileResult {
                index,
                path: path.to_string(),
                language,
                output: Some(output),
                bytes,
                duration_ms,
                error: None,
            }
        }
        Err(e) => {
            warn!(
                path = %path,
                revision = %ctx.target_revision,
                stage = %e.stage(),
                "Skipping file: {}",
                e
            );
            if let Some(ref cb) = ctx.progress {
                cb.on_file_error(index, ctx.total, path, &e.to_string());
            }
            FileResult {
                index,
                path: path.to_string(),
                language,
                output: None,
                bytes: 0,
                duration_ms,
                error: Some(e),
            }
        }
    }
}

/// Close a session left unusable by a panic and launch a replacement.
fn reopen_session(
    id: usize,
    ctx: &WorkerContext,
    broken: Option<RenderSession>,
) -> Option<RenderSession> {
    if let Some(mut broken) = broken {
        if panic::catch_unwind(AssertUnwindSafe(|| broken.close())).is_err() {
            warn!(worker = id, "Closing the broken render session panicked");
        }
    }
    match RenderSession::open(ctx.launcher.as_ref(), ctx.settings.clone()) {
        Ok(session) => {
            debug!(worker = id, "Render session reopened");
            Some(session)
        }
        Err(e) => {
            error!(worker = id, "Could not reopen render session: {}", e);
            None
        }
    }
}

/// Record a file that failed outside the normal render path.
fn failed_file(ctx: &WorkerContext, index: usize, path: &str, e: FileError) -> FileResult {
    warn!(
        path = %path,
        revision = %ctx.target_revision,
        stage = %e.stage(),
        "Skipping file: {}",
        e
    );
    if let Some(ref cb) = ctx.progress {
        cb.on_file_error(index, ctx.total, path, &e.to_string());
    }
    FileResult {
        index,
        path: path.to_string(),
        language: String::new(),
        output: None,
        bytes: 0,
        duration_ms: 0,
        error: Some(e),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn render_file(
    ctx: &WorkerContext,
    session: &mut RenderSession,
    path: &str,
    language: &mut String,
) -> Result<(PathBuf, usize), FileError> {
    let content = ctx
        .source
        .file_content(&ctx.target_revision, path)
        .map_err(|e| FileError::ContentFetch {
            path: path.to_string(),
            revision: ctx.target_revision.clone(),
            detail: e.to_string(),
        })?;

    let request = RenderRequest::for_file(&ctx.template, path, content, classify(path));
    language.clone_from(&request.language);
    debug!(
        path = %path,
        language = %request.language,
        format = %request.format,
        "Rendering"
    );

    let bytes = session
        .render(&request)
        .map_err(|e| FileError::from_render(path, e))?;

    let name = output_file_name(path, request.format);
    let output = write_artifact(&ctx.output_dir, &name, &bytes).map_err(|e| {
        FileError::WriteFailed {
            path: path.to_string(),
            output: ctx.output_dir.join(&name),
            detail: e.to_string(),
        }
    })?;
    Ok((output, bytes.len()))
}

fn assemble_report(job: &BatchJob, files: Vec<FileResult>, started: Instant) -> BatchReport {
    let succeeded = files.iter().filter(|f| f.is_success()).count();
    let stats = BatchStats {
        total_files: files.len(),
        succeeded,
        failed: files.len() - succeeded,
        total_bytes: files.iter().map(|f| f.bytes as u64).sum(),
        total_duration_ms: started.elapsed().as_millis() as u64,
    };
    BatchReport {
        source_revision: job.source_revision.clone(),
        target_revision: job.target_revision.clone(),
        output_dir: job.output_dir.clone(),
        files,
        stats,
    }
}

/// Chrome launch settings for a batch, with clipboard access granted to the
/// rendering origin.
fn chrome_options(config: &BatchConfig) -> ChromeOptions {
    ChromeOptions {
        headless: config.headless,
        window_size: config.window_size,
        idle_browser_timeout: Duration::from_secs(config.idle_browser_timeout_secs),
        clipboard_origin: origin_of(&config.base_url),
    }
}

/// `scheme://host[:port]` of an absolute URL.
fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '#', '?']).next().unwrap_or_default();
    if scheme.is_empty() || authority.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{authority}"))
}
