//! # patocr
//!
//! Resumable, parallel OCR of scanned patent PDFs.
//!
//! Batches run to tens of thousands of documents and hours of wall-clock
//! time. Workers crash, hosts reboot, and operators press Ctrl-C, so the
//! crate is built around one guarantee: **re-running the same command never
//! redoes finished work and never duplicates a committed result.**
//!
//! ## Pipeline Overview
//!
//! ```text
//! root dir / manifest
//!  │
//!  ├─ 1. Discover  walk *.pdf, subtract the checkpoint logs
//!  ├─ 2. Pool      N concurrent documents, each isolated + timed out
//!  │    ├─ render   rasterise pages via pdfium (spawn_blocking), crop regions
//!  │    ├─ ocr      tesseract per region (chi_sim, --psm 6)
//!  │    └─ section  locate the Description body by page headers
//!  └─ 3. Commit    append result (JSONL) → append checkpoint → mark done
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patocr::{run_ocr_batch, BatchConfig, ShutdownSignal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder("/data/SIPO_PDF", "./ocr_results")
//!         .workers(8)
//!         .build()?;
//!     let stats = run_ocr_batch(&config, ShutdownSignal::new()).await?;
//!     eprintln!("{}", stats.summary_line());
//!     Ok(())
//! }
//! ```
//!
//! ## Output Files
//!
//! | File (description mode) | Contents |
//! |------|----------|
//! | `finish.txt` | one line per completed document: id, timestamp, optional `section-not-found` |
//! | `failed.txt` | one line per failed document: id, timestamp, reason |
//! | `FullText.jsonl` | one `{"pnr": …, "description": …}` per line |
//! | `missingpdf.txt` | manifest ids with no PDF on disk (rewritten each run) |
//!
//! Failed documents are not retried automatically; delete their line from
//! the failure log to force a retry.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `patocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! patocr = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod checkpoint;
pub mod commit;
pub mod config;
pub mod discover;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod reconcile;
pub mod section;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{preflight, run_batch, run_ocr_batch, run_ocr_batch_sync};
pub use checkpoint::{CheckpointOutcome, CheckpointRecord, CheckpointStore};
pub use commit::{CommitLog, CommitStatus};
pub use config::{BatchConfig, BatchConfigBuilder, ExtractionMode, LogPaths, OcrConfig};
pub use discover::{discover, enumerate_sources, Discovery, Enumeration, Manifest};
pub use error::{BatchError, CommitError, ExtractionError, ItemError, OcrError};
pub use output::{canonical_pnr, BatchStats, DocumentId, ItemStatus, Processed, ResultRecord, WorkItem};
pub use pipeline::document::OcrPipeline;
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use pipeline::render::{ImageRegion, PdfiumExtractor, RegionExtractor};
pub use pool::{run_pool, DocumentProcessor, PoolOptions, ShutdownSignal};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reconcile::{find_continuations, reconcile_checkpoints, ReconcileReport};
pub use section::{KeywordSet, SectionDetector, SectionRules, SectionScan, SectionSpan};
pub use sink::{read_result_log, ResultSink};
