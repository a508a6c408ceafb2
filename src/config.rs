//! Configuration types for a batch OCR run.
//!
//! Everything a run depends on (paths, worker count, OCR engine settings,
//! section keywords) lives in one [`BatchConfig`] value that is handed to the
//! extractor, the OCR adapter and the worker pool when they are constructed.
//! There is no process-wide state: two runs with different configs can share
//! a process.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use crate::section::SectionRules;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`].
///
/// # Example
/// ```rust
/// use patocr::{BatchConfig, ExtractionMode};
///
/// let config = BatchConfig::builder("/data/pdfs", "./ocr_results")
///     .workers(4)
///     .mode(ExtractionMode::FrontPage)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_dpi(), 400);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Root directory walked recursively for `*.pdf` files.
    pub root_dir: PathBuf,

    /// Directory holding the checkpoint, result and missing logs.
    pub output_dir: PathBuf,

    /// Optional manifest restricting the run to listed document ids.
    pub manifest: Option<PathBuf>,

    /// Number of documents processed concurrently. Default: 10.
    pub workers: usize,

    /// Which regions are OCR'd and how the record is assembled.
    pub mode: ExtractionMode,

    /// Rendering DPI. `None` uses the mode default (300 for the description
    /// body, 400 for front-page columns).
    pub dpi: Option<u32>,

    /// Upper bound on either edge of a rendered page, in pixels. Default: 6000.
    ///
    /// A0-sized scans at 400 DPI would otherwise allocate several hundred MB
    /// per page.
    pub max_rendered_pixels: u32,

    /// OCR language and segmentation settings.
    pub ocr: OcrConfig,

    /// Tesseract executable. Default: `tesseract` (resolved through PATH).
    pub tesseract_cmd: String,

    /// Directory containing libpdfium. `None` binds the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Wall-clock budget per document, covering rasterisation and OCR.
    /// Default: 600 s.
    pub item_timeout_secs: u64,

    /// Directory names skipped during the walk (e.g. download staging dirs).
    pub exclude_dirs: Vec<String>,

    /// Start/end keywords for the section boundary detector.
    pub section: SectionRules,

    /// Progress events sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("root_dir", &self.root_dir)
            .field("output_dir", &self.output_dir)
            .field("manifest", &self.manifest)
            .field("workers", &self.workers)
            .field("mode", &self.mode)
            .field("dpi", &self.effective_dpi())
            .field("ocr", &self.ocr)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("item_timeout_secs", &self.item_timeout_secs)
            .field("exclude_dirs", &self.exclude_dirs)
            .field("section", &self.section)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder(root_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self {
                root_dir: root_dir.into(),
                output_dir: output_dir.into(),
                manifest: None,
                workers: 10,
                mode: ExtractionMode::default(),
                dpi: None,
                max_rendered_pixels: 6000,
                ocr: OcrConfig::default(),
                tesseract_cmd: "tesseract".to_string(),
                pdfium_lib_path: None,
                item_timeout_secs: 600,
                exclude_dirs: Vec::new(),
                section: SectionRules::default(),
                progress_callback: None,
            },
        }
    }

    /// DPI actually used for rendering.
    pub fn effective_dpi(&self) -> u32 {
        self.dpi.unwrap_or_else(|| self.mode.default_dpi())
    }

    /// Per-item timeout as a `Duration`.
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    /// Log file locations for this run's mode.
    pub fn log_paths(&self) -> LogPaths {
        LogPaths::for_mode(&self.output_dir, self.mode)
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifest = Some(path.into());
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = Some(dpi);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr(mut self, ocr: OcrConfig) -> Self {
        self.config.ocr = ocr;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn item_timeout_secs(mut self, secs: u64) -> Self {
        self.config.item_timeout_secs = secs;
        self
    }

    pub fn exclude_dir(mut self, name: impl Into<String>) -> Self {
        self.config.exclude_dirs.push(name.into());
        self
    }

    pub fn section(mut self, rules: SectionRules) -> Self {
        self.config.section = rules;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(BatchError::InvalidConfig("Worker count must be ≥ 1".into()));
        }
        if let Some(dpi) = c.dpi {
            if !(72..=600).contains(&dpi) {
                return Err(BatchError::InvalidConfig(format!(
                    "DPI must be 72–600, got {dpi}"
                )));
            }
        }
        if c.item_timeout_secs == 0 {
            return Err(BatchError::InvalidConfig(
                "Item timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr.language.trim().is_empty() {
            return Err(BatchError::InvalidConfig("OCR language must not be empty".into()));
        }
        c.section.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What is OCR'd from each document and how the record is shaped.
///
/// | Mode | Regions | Record fields |
/// |------|---------|---------------|
/// | `Description` | every page, whole | `description` |
/// | `FrontPage` | page 1 below the banner, split in two columns | `left`, `right` |
/// | `FrontPageContinued` | page 1 as above + page 2 columns | `left1`, `right1`, `left2`, `right2` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    /// Full-text OCR of the "Description" section (default).
    #[default]
    Description,
    /// Two-column OCR of the bibliographic front page.
    FrontPage,
    /// Front page plus its continuation page.
    FrontPageContinued,
}

impl ExtractionMode {
    /// Rendering DPI used when the config does not override it.
    pub fn default_dpi(self) -> u32 {
        match self {
            ExtractionMode::Description => 300,
            ExtractionMode::FrontPage | ExtractionMode::FrontPageContinued => 400,
        }
    }

    /// Whether the section boundary detector runs for this mode.
    pub fn detects_section(self) -> bool {
        matches!(self, ExtractionMode::Description)
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionMode::Description => "description",
            ExtractionMode::FrontPage => "front-page",
            ExtractionMode::FrontPageContinued => "front-page-continued",
        })
    }
}

/// Language and page-segmentation settings passed to the OCR engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract language pack(s), e.g. `chi_sim` or `chi_sim+eng`.
    pub language: String,
    /// Page segmentation mode (`--psm`). Default: 6, a single uniform block.
    pub psm: Option<u8>,
    /// OCR engine mode (`--oem`). Default: engine default.
    pub oem: Option<u8>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "chi_sim".to_string(),
            psm: Some(6),
            oem: None,
        }
    }
}

/// Locations of the four files a run reads and appends to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    /// Success checkpoint log (one document id per line).
    pub success: PathBuf,
    /// Failure checkpoint log.
    pub failure: PathBuf,
    /// JSON Lines result log.
    pub results: PathBuf,
    /// Manifest entries with no file on disk (rewritten each run).
    pub missing: PathBuf,
}

impl LogPaths {
    /// File names used by each mode inside `output_dir`.
    pub fn for_mode(output_dir: &Path, mode: ExtractionMode) -> Self {
        let (success, failure, results, missing) = match mode {
            ExtractionMode::Description => {
                ("finish.txt", "failed.txt", "FullText.jsonl", "missingpdf.txt")
            }
            ExtractionMode::FrontPage => (
                "finish_frontpage.txt",
                "failed_frontpage.txt",
                "frontpage.jsonl",
                "missing_frontpage.txt",
            ),
            ExtractionMode::FrontPageContinued => (
                "finish_second_pg.txt",
                "failed_second_pg.txt",
                "frontpage_second_pg.jsonl",
                "missing_second_pg.txt",
            ),
        };
        Self {
            success: output_dir.join(success),
            failure: output_dir.join(failure),
            results: output_dir.join(results),
            missing: output_dir.join(missing),
        }
    }
}
