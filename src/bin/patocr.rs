//! CLI binary for patocr.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! wires Ctrl-C to the shutdown signal and prints the run summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use patocr::{
    find_continuations, reconcile_checkpoints, run_ocr_batch, BatchConfig, BatchProgressCallback,
    BatchStats, CheckpointOutcome, DocumentId, ExtractionMode, LogPaths, OcrConfig,
    ProgressCallback, ShutdownSignal,
};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

/// Terminal progress callback: a live progress bar plus one log line per
/// committed document. Documents finish out of order, so start times are
/// keyed by id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<DocumentId, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports how many documents are queued.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning source tree…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>5}/{len} docs  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, id: &DocumentId) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize, already_done: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("{total} documents queued")),
            dim(&format!("({already_done} already done)")),
        ));
    }

    fn on_item_start(&self, id: &DocumentId) {
        self.start_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone(), Instant::now());
        self.bar.set_message(id.to_string());
    }

    fn on_item_complete(&self, id: &DocumentId, outcome: &CheckpointOutcome, _completed: usize, _total: usize) {
        let secs = self.elapsed_secs(id);
        let mark = match outcome {
            CheckpointOutcome::SectionNotFound => cyan("○"),
            _ => green("✓"),
        };
        let note = match outcome {
            CheckpointOutcome::SectionNotFound => dim("section not found"),
            _ => String::new(),
        };
        self.bar.println(format!(
            "  {} {:<16}  {}  {}",
            mark,
            id,
            dim(&format!("{secs:.1}s")),
            note,
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, id: &DocumentId, error: &str, _completed: usize, _total: usize) {
        let secs = self.elapsed_secs(id);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per document.
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<16}  {}  {}",
            red("✗"),
            id,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let failed = stats.failed + stats.commit_failed;
        if failed == 0 {
            eprintln!(
                "{} {} documents committed",
                green("✔"),
                bold(&(stats.succeeded + stats.section_not_found).to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents committed  ({} failed)",
                if failed == stats.completed() { red("✘") } else { cyan("⚠") },
                bold(&(stats.succeeded + stats.section_not_found).to_string()),
                stats.completed(),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR the Description section of every PDF under a tree
  patocr run /data/SIPO_PDF -o ./ocr_results

  # Only the documents listed in a manifest (first '|' field is the id)
  patocr run /data/SIPO_PDF --manifest pdflist.txt -w 16

  # Two-column front-page OCR at 400 DPI
  patocr run /data/SIPO_PDF --mode front-page

  # After a crash: checkpoint results that were written but not marked done
  patocr reconcile -o ./ocr_results

  # Build a manifest of front pages that continue on page 2, then OCR them
  patocr continuations -o ./ocr_results --out second_pg.txt
  patocr run /data/SIPO_PDF --mode front-page-continued --manifest second_pg.txt

RESUMING:
  Re-running the same command skips every document already listed in the
  success or failure log. To retry a failed document, delete its line from
  the failure log (failed.txt in description mode).

ENVIRONMENT VARIABLES:
  PATOCR_PDFIUM_LIB   Directory containing libpdfium (default: system library)
  PATOCR_TESSERACT    Tesseract executable (default: tesseract on PATH)
  RUST_LOG            Override the log filter (e.g. patocr=debug)
"#;

/// Resumable batch OCR of scanned patent PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "patocr",
    version,
    about = "Resumable batch OCR of scanned patent PDFs",
    long_about = "OCR large trees of scanned patent PDFs with Tesseract. Progress is \
checkpointed after every document so an interrupted run can be restarted with the same \
command without redoing or duplicating work.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PATOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PATOCR_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR every outstanding PDF under a directory.
    Run(RunArgs),
    /// Write success checkpoints for results that have none.
    Reconcile(ReconcileArgs),
    /// List front-page results that continue on page 2.
    Continuations(ContinuationArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Root directory searched recursively for *.pdf files.
    dir: PathBuf,

    /// Directory for the checkpoint and result logs.
    #[arg(short, long, env = "PATOCR_OUTPUT", default_value = "./ocr_results")]
    output: PathBuf,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "PATOCR_WORKERS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=256))]
    workers: u64,

    /// Restrict the run to the ids listed in this file.
    #[arg(long, alias = "pdflist", env = "PATOCR_MANIFEST")]
    manifest: Option<PathBuf>,

    /// What to OCR from each document.
    #[arg(long, value_enum, default_value = "description")]
    mode: ModeArg,

    /// Rendering DPI (72–600). Default: 300, or 400 for front-page modes.
    #[arg(long, env = "PATOCR_DPI",
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Tesseract language pack(s).
    #[arg(long, env = "PATOCR_LANG", default_value = "chi_sim")]
    lang: String,

    /// Tesseract page segmentation mode.
    #[arg(long, default_value_t = 6)]
    psm: u8,

    /// Tesseract OCR engine mode.
    #[arg(long)]
    oem: Option<u8>,

    /// Tesseract executable.
    #[arg(long, env = "PATOCR_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Directory containing libpdfium.
    #[arg(long, env = "PATOCR_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Per-document timeout in seconds.
    #[arg(long, env = "PATOCR_ITEM_TIMEOUT", default_value_t = 600)]
    item_timeout: u64,

    /// Characters of each page's OCR text inspected for section headings.
    #[arg(long, default_value_t = 50)]
    header_chars: usize,

    /// Directory name to skip during the walk (repeatable).
    #[arg(long = "exclude-dir", value_name = "NAME")]
    exclude_dirs: Vec<String>,

    /// Disable the progress bar.
    #[arg(long, env = "PATOCR_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Directory holding the logs.
    #[arg(short, long, env = "PATOCR_OUTPUT", default_value = "./ocr_results")]
    output: PathBuf,

    /// Which mode's logs to reconcile.
    #[arg(long, value_enum, default_value = "description")]
    mode: ModeArg,
}

#[derive(Args, Debug)]
struct ContinuationArgs {
    /// Directory holding the front-page result log.
    #[arg(short, long, env = "PATOCR_OUTPUT", default_value = "./ocr_results")]
    output: PathBuf,

    /// Front-page result log to scan. Default: <output>/frontpage.jsonl.
    #[arg(long)]
    results: Option<PathBuf>,

    /// Manifest to write.
    #[arg(long = "out", default_value = "second_pg.txt")]
    manifest_out: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Description,
    FrontPage,
    FrontPageContinued,
}

impl From<ModeArg> for ExtractionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Description => ExtractionMode::Description,
            ModeArg::FrontPage => ExtractionMode::FrontPage,
            ModeArg::FrontPageContinued => ExtractionMode::FrontPageContinued,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = match &cli.command {
        Command::Run(args) => !cli.quiet && !args.no_progress,
        _ => false,
    };
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

    match cli.command {
        Command::Run(ref args) => run(&cli, args, show_progress).await,
        Command::Reconcile(ref args) => reconcile(&cli, args).await,
        Command::Continuations(ref args) => continuations(&cli, args).await,
    }
}

async fn run(cli: &Cli, args: &RunArgs, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;

    // ── Ctrl-C: stop dispatching, let in-flight documents commit; twice exits ─
    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if relay_interrupts(tokio::signal::ctrl_c, &shutdown).await {
                eprintln!("{} second interrupt, exiting without waiting", red("✗"));
                // A torn log tail is truncated when the log is next opened.
                std::process::exit(130);
            }
        });
    }

    let stats = run_ocr_batch(&config, shutdown)
        .await
        .context("Batch failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  {}ms",
            if stats.failed + stats.commit_failed == 0 { green("✔") } else { cyan("⚠") },
            stats.summary_line(),
            dim(&stats.total_duration_ms.to_string()),
        );
        eprintln!(
            "   results  →  {}",
            bold(&config.log_paths().results.display().to_string())
        );
    }
    Ok(())
}

async fn reconcile(cli: &Cli, args: &ReconcileArgs) -> Result<()> {
    let paths = LogPaths::for_mode(&args.output, args.mode.into());
    let report = reconcile_checkpoints(&paths)
        .await
        .with_context(|| format!("Failed to reconcile logs in {}", args.output.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {} results scanned, {} checkpoints recovered, {} duplicate results, {} malformed lines",
            green("✔"),
            report.records,
            bold(&report.recovered.len().to_string()),
            report.duplicate_results,
            report.malformed_lines,
        );
        for id in &report.recovered {
            eprintln!("  {} {}", green("+"), id);
        }
    }
    Ok(())
}

async fn continuations(cli: &Cli, args: &ContinuationArgs) -> Result<()> {
    let results = args
        .results
        .clone()
        .unwrap_or_else(|| LogPaths::for_mode(&args.output, ExtractionMode::FrontPage).results);
    let ids = find_continuations(&results, &args.manifest_out)
        .await
        .with_context(|| format!("Failed to scan {}", results.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {} continued front pages  →  {}",
            green("✔"),
            bold(&ids.len().to_string()),
            args.manifest_out.display(),
        );
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
/// The first interrupt asks the batch to finish in-flight documents. Returns
/// `true` on the second one, `false` if the signal source fails.
async fn relay_interrupts<F, Fut>(mut next: F, shutdown: &ShutdownSignal) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if next().await.is_err() {
        return false;
    }
    eprintln!(
        "{} interrupt received, finishing in-flight documents… (Ctrl-C again to abort)",
        cyan("⚠")
    );
    shutdown.trigger();
    next().await.is_ok()
}

fn build_config(args: &RunArgs, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mode: ExtractionMode = args.mode.into();
    let mut section = patocr::SectionRules::default();
    section.header_chars = args.header_chars;

    let mut builder = BatchConfig::builder(&args.dir, &args.output)
        .workers(args.workers as usize)
        .mode(mode)
        .ocr(OcrConfig {
            language: args.lang.clone(),
            psm: Some(args.psm),
            oem: args.oem,
        })
        .tesseract_cmd(args.tesseract.clone())
        .item_timeout_secs(args.item_timeout)
        .section(section);

    if let Some(ref manifest) = args.manifest {
        builder = builder.manifest(manifest);
    }
    if let Some(dpi) = args.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(ref dir) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(dir);
    }
    for name in &args.exclude_dirs {
        builder = builder.exclude_dir(name.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args_map_to_config() {
        let cli = Cli::parse_from([
            "patocr", "run", "/data", "-o", "out", "-w", "4", "--mode", "front-page",
            "--pdflist", "list.txt", "--exclude-dir", "dload", "--header-chars", "30",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = build_config(&args, None).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.mode, ExtractionMode::FrontPage);
        assert_eq!(config.effective_dpi(), 400);
        assert_eq!(config.manifest, Some(PathBuf::from("list.txt")));
        assert_eq!(config.exclude_dirs, vec!["dload".to_string()]);
        assert_eq!(config.section.header_chars, 30);
    }

    type Interrupt = futures::future::BoxFuture<'static, io::Result<()>>;

    /// Interrupt source that fires `ready` times, then never again.
    fn interrupts(ready: usize) -> impl FnMut() -> Interrupt {
        let mut fired = 0;
        move || -> Interrupt {
            fired += 1;
            if fired <= ready {
                Box::pin(futures::future::ready(Ok(())))
            } else {
                Box::pin(futures::future::pending())
            }
        }
    }

    #[tokio::test]
    async fn second_interrupt_aborts() {
        let shutdown = ShutdownSignal::new();
        assert!(relay_interrupts(interrupts(2), &shutdown).await);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn single_interrupt_only_requests_shutdown() {
        let shutdown = ShutdownSignal::new();
        let relay = relay_interrupts(interrupts(1), &shutdown);
        let waited = tokio::time::timeout(Duration::from_millis(50), relay).await;
        assert!(waited.is_err(), "returned without a second interrupt");
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn failed_signal_source_changes_nothing() {
        let shutdown = ShutdownSignal::new();
        let relay = relay_interrupts(
            || -> Interrupt { Box::pin(futures::future::ready(Err(io::Error::other("no handler")))) },
            &shutdown,
        );
        assert!(!relay.await);
        assert!(!shutdown.is_triggered());
    }
}
