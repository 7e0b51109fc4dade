//! CLI binary for rayso-diff.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchJob` + `BatchConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayso_diff::{
    generate, BatchConfig, BatchJob, BatchProgressCallback, ExportFormat, ExportScale, Padding,
    ProgressCallback, RenderOptions,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per file.
/// Files may finish out of order when more than one worker runs.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-file wall-clock start times, keyed by list index.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports the file count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading changed files…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_files} changed files…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, path: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(path.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, path: &str, bytes: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            path,
            dim(&format!("{bytes} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, path: &str, error: &str) {
        let secs = self.elapsed_secs(index);

        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            path,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if total_files == 0 {
            eprintln!("{} no changed files", dim("·"));
        } else if failed == 0 {
            eprintln!(
                "{} {} files rendered successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files rendered  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every file changed on the current branch since it left main
  rayso-diff

  # Explicit repository, revisions and output directory
  rayso-diff ~/src/app v1.2.0 v1.3.0 ./cards

  # SVG cards in light mode without background
  rayso-diff . main HEAD --format svg --dark-mode false --background false

  # Shareable links instead of images
  rayso-diff --format url

  # Larger PNGs, fixed title and theme
  rayso-diff --size 6x --title "Release 1.3" --theme midnight --padding lg

  # Machine-readable report
  rayso-diff --json > report.json

OUTPUT NAMING:
  src/lib/a.ts  →  src_lib_a.ts.png | src_lib_a.ts.svg | src_lib_a.ts.url.txt

ENVIRONMENT VARIABLES:
  RAYSO_DIFF_BASE_URL     Rendering page (default https://ray.so/)
  RAYSO_DIFF_WORKERS      Browser pages rendering in parallel
  RAYSO_DIFF_HEADED       Show the browser window
  CHROME                  Path to the Chrome/Chromium executable
  RUST_LOG                Tracing filter, overrides -v/-q
"#;

/// Render files changed between two git revisions as ray.so code cards.
#[derive(Parser, Debug)]
#[command(
    name = "rayso-diff",
    version,
    about = "Render files changed between two git revisions as ray.so code cards",
    long_about = "Render every file changed between two git revisions as a ray.so code card. \
Each file becomes one PNG, SVG or shareable link in the output directory; a file that fails \
is reported and skipped without stopping the rest.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Repository location (any path inside the working tree).
    #[arg(default_value = ".")]
    repo: PathBuf,

    /// Base revision of the diff.
    #[arg(default_value = "main")]
    source: String,

    /// Revision whose file content is rendered.
    #[arg(default_value = "HEAD")]
    target: String,

    /// Directory the artifacts are written to (created if missing).
    #[arg(default_value = "./rayso_images")]
    output_dir: PathBuf,

    /// Card title for every file (default: the file's path).
    #[arg(long, env = "RAYSO_DIFF_TITLE")]
    title: Option<String>,

    /// Colour theme.
    #[arg(long, env = "RAYSO_DIFF_THEME", default_value = "candy")]
    theme: String,

    /// Padding: sm, md, lg, xl or a pixel count. Unknown values mean md.
    #[arg(long, env = "RAYSO_DIFF_PADDING", default_value = "md", value_parser = parse_padding)]
    padding: Padding,

    /// Highlighter language for every file (default: from the extension).
    #[arg(long, env = "RAYSO_DIFF_LANGUAGE")]
    language: Option<String>,

    /// Draw the card background.
    #[arg(long, env = "RAYSO_DIFF_BACKGROUND", default_value_t = true,
          action = clap::ArgAction::Set)]
    background: bool,

    /// Dark colour scheme.
    #[arg(long, alias = "darkMode", env = "RAYSO_DIFF_DARK_MODE", default_value_t = true,
          action = clap::ArgAction::Set)]
    dark_mode: bool,

    /// Export format: png, svg or url (also raster, vector, link).
    #[arg(long, env = "RAYSO_DIFF_FORMAT", default_value = "png")]
    format: ExportFormat,

    /// Export scale for png and svg: 2x, 4x or 6x.
    #[arg(long, env = "RAYSO_DIFF_SIZE", default_value = "4x")]
    size: ExportScale,

    /// Rendering page URL.
    #[arg(long, env = "RAYSO_DIFF_BASE_URL", default_value = rayso_diff::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Seconds to wait for the page to load and settle.
    #[arg(long, env = "RAYSO_DIFF_NAVIGATION_TIMEOUT", default_value_t = 30)]
    navigation_timeout: u64,

    /// Seconds to wait for the render surface to appear.
    #[arg(long, env = "RAYSO_DIFF_SURFACE_TIMEOUT", default_value_t = 10)]
    surface_timeout: u64,

    /// Seconds to wait for each export control.
    #[arg(long, env = "RAYSO_DIFF_CONTROL_TIMEOUT", default_value_t = 10)]
    control_timeout: u64,

    /// Browser pages rendering in parallel (one browser each).
    #[arg(short, long, env = "RAYSO_DIFF_WORKERS", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..=16))]
    workers: u16,

    /// Show the browser window.
    #[arg(long, env = "RAYSO_DIFF_HEADED")]
    headed: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "RAYSO_DIFF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "RAYSO_DIFF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RAYSO_DIFF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RAYSO_DIFF_QUIET")]
    quiet: bool,
}

fn parse_padding(s: &str) -> Result<Padding, std::convert::Infallible> {
    Ok(Padding::parse(s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if !cli.format.supports_scale() {
        tracing::debug!("--size has no effect with --format {}", cli.format);
    }

    // ── Build job + config ───────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let job = build_job(&cli);
    let config = build_config(&cli, progress_cb)?;

    // ── Run batch ────────────────────────────────────────────────────────
    let report = generate(&job, &config).await.context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        if !show_progress {
            for failure in report.failures() {
                eprintln!("{} {}", red("✗"), failure);
            }
            eprintln!(
                "Rendered {}/{} files in {}ms",
                report.stats.succeeded, report.stats.total_files, report.stats.total_duration_ms
            );
        }
        if report.stats.succeeded > 0 {
            eprintln!(
                "   {} bytes  →  {}",
                dim(&report.stats.total_bytes.to_string()),
                bold(&report.output_dir.display().to_string()),
            );
        }
    }

    // Per-file failures are reported above; the run itself succeeded.
    Ok(())
}

/// Map CLI args to `BatchJob`.
fn build_job(cli: &Cli) -> BatchJob {
    BatchJob {
        repository: cli.repo.clone(),
        source_revision: cli.source.clone(),
        target_revision: cli.target.clone(),
        output_dir: cli.output_dir.clone(),
        template: RenderOptions {
            title: cli.title.clone(),
            theme: cli.theme.clone(),
            padding: cli.padding,
            language: cli.language.clone(),
            background: cli.background,
            dark_mode: cli.dark_mode,
            format: cli.format,
            scale: cli.size,
        },
    }
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .base_url(cli.base_url.clone())
        .navigation_timeout_secs(cli.navigation_timeout)
        .surface_timeout_secs(cli.surface_timeout)
        .control_timeout_secs(cli.control_timeout)
        .workers(cli.workers as usize)
        .headless(!cli.headed);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
