//! Error types for the patocr library.
//!
//! Errors are split by blast radius:
//!
//! * [`BatchError`] (**fatal**): the run cannot start or its logs cannot be
//!   opened (manifest declared but missing, output directory not writable,
//!   OCR engine not installed). Returned as `Err(BatchError)` from the
//!   top-level `run_*` functions before any worker starts.
//!
//! * [`ItemError`] (**per item**): one document failed (unreadable file,
//!   OCR crash, timeout). Caught at the item boundary and turned into a
//!   Failure checkpoint; it never aborts sibling items.
//!
//! * [`CommitError`]: the log append for one item failed. The item is
//!   reported failed for this run but no checkpoint is written, so the next
//!   run retries it.
//!
//! [`ExtractionError`] and [`OcrError`] are the failure types of the two
//! external collaborators; both convert into [`ItemError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the patocr library.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Discovery errors ──────────────────────────────────────────────────
    /// A manifest was declared but does not exist.
    #[error("Manifest file not found: '{path}'\nCheck the --manifest path.")]
    ManifestNotFound { path: PathBuf },

    /// A manifest exists but could not be read.
    #[error("Failed to read manifest '{path}': {source}")]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The root document directory could not be walked.
    #[error("Failed to read source directory '{path}': {source}")]
    SourceDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Log errors ────────────────────────────────────────────────────────
    /// Could not create the output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not open or replay one of the append-only logs.
    #[error("Failed to open log '{path}': {source}")]
    LogOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a report file (missing list, reconcile output).
    #[error("Failed to write '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A section keyword produced an unusable pattern.
    #[error("Invalid section pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    // ── Collaborator preflight ────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point --pdfium-lib at the directory\n\
that contains it (PATOCR_PDFIUM_LIB).\n"
    )]
    PdfiumBindingFailed(String),

    /// The OCR engine is not runnable on this host.
    #[error("OCR engine unavailable: {0}")]
    OcrEngineUnavailable(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of the Region Extractor for one document.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// Source file does not exist.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// pdfium could not parse the document.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The layout needs a page the document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A cropped region could not be PNG-encoded.
    #[error("Encoding region '{region}' failed: {detail}")]
    EncodeFailed { region: String, detail: String },

    /// pdfium could not be bound inside the worker.
    #[error("pdfium binding failed: {0}")]
    Binding(String),
}

/// Failure of the OCR Adapter for one image region.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine binary is missing or not executable.
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    /// The engine ran but exited unsuccessfully.
    #[error("OCR engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    /// The engine printed something that is not UTF-8 text.
    #[error("OCR engine output is not UTF-8: {0}")]
    InvalidOutput(String),

    /// Temp-file or pipe I/O around the engine failed.
    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal error for a single work item.
///
/// Converted into a Failure checkpoint by the worker pool.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The document identifier cannot be used as a log key.
    #[error("Malformed document identifier {id:?}")]
    MalformedId { id: String },

    /// Region extraction (rasterisation) failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// OCR failed for one region.
    #[error("OCR failed on region '{region}': {source}")]
    Ocr {
        region: String,
        #[source]
        source: OcrError,
    },

    /// The item exceeded the per-item wall-clock budget.
    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The process function panicked; the panic was contained.
    #[error("Worker panicked: {0}")]
    Panicked(String),

    /// Unexpected internal error (e.g. a blocking task was cancelled).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to durably commit one item.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Appending the result record failed; nothing was checkpointed.
    #[error("Failed to append result to '{path}': {source}")]
    ResultAppend {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint was not appended. A result appended just before it is
    /// retracted when it is still the last line of the result log.
    #[error("Failed to append checkpoint to '{path}': {source}")]
    CheckpointAppend {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record could not be serialised.
    #[error("Failed to serialise result: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_not_found_display() {
        let e = BatchError::ManifestNotFound {
            path: PathBuf::from("/tmp/pdflist.txt"),
        };
        assert!(e.to_string().contains("pdflist.txt"));
    }

    #[test]
    fn timeout_display() {
        let e = ItemError::Timeout { secs: 600 };
        assert!(e.to_string().contains("600s"));
    }

    #[test]
    fn extraction_error_is_transparent() {
        let e: ItemError = ExtractionError::PageOutOfRange { page: 2, total: 1 }.into();
        assert_eq!(e.to_string(), "Page 2 is out of range (document has 1 pages)");
    }

    #[test]
    fn ocr_error_names_region() {
        let e = ItemError::Ocr {
            region: "left".into(),
            source: OcrError::EngineFailed {
                status: "exit status: 1".into(),
                stderr: "Error opening data file".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("left"), "got: {msg}");
        assert!(msg.contains("exit status: 1"), "got: {msg}");
    }
}
