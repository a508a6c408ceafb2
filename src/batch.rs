//! Top-level batch entry points.
//!
//! ```text
//!  manifest? ─▶ output dir ─▶ open logs (replay) ─▶ walk ─▶ discover
//!        ─▶ missing report ─▶ run_pool ─▶ BatchStats
//! ```
//!
//! Everything before `run_pool` is fatal on error; everything inside it is
//! per-item.

use crate::commit::CommitLog;
use crate::config::BatchConfig;
use crate::discover::{discover, enumerate_sources, write_id_list, Manifest};
use crate::error::BatchError;
use crate::output::BatchStats;
use crate::pipeline::document::OcrPipeline;
use crate::pipeline::ocr::TesseractEngine;
use crate::pipeline::render::PdfiumExtractor;
use crate::pool::{run_pool, DocumentProcessor, PoolOptions, ShutdownSignal};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Run a batch with the pdfium + Tesseract pipeline.
///
/// Checks both collaborators before touching the logs so a misconfigured
/// host fails fast instead of marking every document failed.
///
/// # Returns
/// `Ok(BatchStats)` once the pool has drained, even if documents failed
/// (see `stats.failed`).
///
/// # Errors
/// Only fatal errors: missing manifest, unwritable output directory,
/// unreadable source root, pdfium or tesseract unavailable.
pub async fn run_ocr_batch(config: &BatchConfig, shutdown: ShutdownSignal) -> Result<BatchStats, BatchError> {
    preflight(config).await?;
    let pipeline = OcrPipeline::from_config(config)?;
    run_batch(config, Arc::new(pipeline), shutdown).await
}

/// Synchronous wrapper around [`run_ocr_batch`].
///
/// Creates a Tokio runtime internally. Do not call from within an existing
/// async context.
pub fn run_ocr_batch_sync(config: &BatchConfig) -> Result<BatchStats, BatchError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create runtime: {}", e)))?;
    rt.block_on(run_ocr_batch(config, ShutdownSignal::new()))
}

/// Verify pdfium binds and the tesseract binary runs.
pub async fn preflight(config: &BatchConfig) -> Result<(), BatchError> {
    PdfiumExtractor::from_config(config).preflight()?;
    let version = TesseractEngine::new(config.tesseract_cmd.clone())
        .check_available()
        .await
        .map_err(|e| BatchError::OcrEngineUnavailable(e.to_string()))?;
    info!(tesseract = %version, "OCR engine available");
    Ok(())
}

/// Run a batch with any [`DocumentProcessor`].
pub async fn run_batch(
    config: &BatchConfig,
    processor: Arc<dyn DocumentProcessor>,
    shutdown: ShutdownSignal,
) -> Result<BatchStats, BatchError> {
    let start = Instant::now();
    info!(root = %config.root_dir.display(), mode = %config.mode, "Starting batch");

    // ── Step 1: Manifest ─────────────────────────────────────────────────
    let manifest = match &config.manifest {
        Some(path) => {
            let m = Manifest::load(path).await?;
            info!(entries = m.len(), manifest = %path.display(), "Loaded manifest");
            Some(m)
        }
        None => None,
    };

    // ── Step 2: Logs ─────────────────────────────────────────────────────
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|source| BatchError::OutputDirFailed {
            path: config.output_dir.clone(),
            source,
        })?;
    let paths = config.log_paths();
    let commit_log = Arc::new(CommitLog::open(&paths).await?);
    let replayed = commit_log.checkpoints().replayed();
    info!(
        succeeded = replayed.succeeded,
        failed = replayed.failed,
        "Checkpoint logs replayed"
    );

    // ── Step 3: Discover ─────────────────────────────────────────────────
    let root = config.root_dir.clone();
    let excludes = config.exclude_dirs.clone();
    let found = tokio::task::spawn_blocking(move || enumerate_sources(&root, &excludes))
        .await
        .map_err(|e| BatchError::Internal(format!("Directory walk failed: {}", e)))??;
    let rejected = found.rejected.len();
    let done = commit_log.checkpoints().snapshot();
    let discovery = discover(found.sources, manifest.as_ref(), &done);
    info!(
        enumerated = discovery.enumerated,
        rejected,
        outstanding = discovery.items.len(),
        already_done = discovery.already_done,
        missing = discovery.missing.len(),
        "Discovery complete"
    );

    if manifest.is_some() {
        write_id_list(&paths.missing, &discovery.missing).await?;
        if !discovery.missing.is_empty() {
            warn!(
                count = discovery.missing.len(),
                report = %paths.missing.display(),
                "Manifest entries have no source file"
            );
        }
    }

    // ── Step 4: Pool ─────────────────────────────────────────────────────
    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    progress.on_batch_start(discovery.items.len(), discovery.already_done);

    let opts = PoolOptions {
        workers: config.workers,
        item_timeout: config.item_timeout(),
    };
    let mut stats = run_pool(
        discovery.items,
        &opts,
        processor,
        commit_log,
        Arc::clone(&progress),
        shutdown,
    )
    .await;

    stats.enumerated = discovery.enumerated;
    stats.already_done += discovery.already_done;
    stats.missing = discovery.missing.len();
    stats.rejected = rejected;
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    progress.on_batch_complete(&stats);
    info!("Batch finished: {}", stats.summary_line());
    Ok(stats)
}
