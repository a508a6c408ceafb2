//! Data model shared by discovery, the worker pool and the logs.

use crate::error::ItemError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

// ── Document identity ───────────────────────────────────────────────────────

/// Canonical identifier of one source document, e.g. `CN101234567A`.
///
/// Used verbatim as the checkpoint key and as the `pnr` of its result record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id from a file name: everything before the first `.`.
    ///
    /// `CN101234567A.pdf` → `CN101234567A`. Returns `None` when the path has
    /// no file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        let stem = name.split('.').next().unwrap_or_default();
        Some(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the id can be written as the first field of a log line.
    pub fn validate(&self) -> Result<(), ItemError> {
        let bad = self.0.is_empty()
            || self
                .0
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '|');
        if bad {
            Err(ItemError::MalformedId { id: self.0.clone() })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

static RE_PNR: Lazy<Regex> = Lazy::new(|| Regex::new(r"CN\d+[A-Z]").unwrap());

/// Extract the canonical patent number from noisy text.
///
/// Result logs from older runs sometimes carry a path or suffix around the
/// number (`CN101234567A-p920mint`); the first `CN<digits><letter>` token is
/// the identity.
pub fn canonical_pnr(text: &str) -> Option<&str> {
    RE_PNR.find(text).map(|m| m.as_str())
}

// ── Work items ──────────────────────────────────────────────────────────────

/// Lifecycle of a work item within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Discovered, not yet picked up by a worker.
    Pending,
    /// Owned by a worker.
    InProgress,
    /// Committed with a Success (or SectionNotFound) checkpoint, or found
    /// already checkpointed at commit time.
    Done,
    /// Committed with a Failure checkpoint, or its commit failed.
    Failed,
}

/// One document awaiting processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: DocumentId,
    pub source_path: PathBuf,
    pub status: ItemStatus,
}

impl WorkItem {
    pub fn new(id: DocumentId, source_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            source_path: source_path.into(),
            status: ItemStatus::Pending,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// One line of the result log.
///
/// `pnr` is always present; the remaining fields depend on the extraction
/// mode (`description`, or `left`/`right`, …) and are written flat next to
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub pnr: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResultRecord {
    pub fn new(id: &DocumentId) -> Self {
        Self {
            pnr: id.as_str().to_string(),
            fields: Map::new(),
        }
    }

    /// Add a text field.
    pub fn with_field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::String(text.into()));
        self
    }

    /// Text of a string field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Successful outcome of processing one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// A record to append to the result log.
    Record(ResultRecord),
    /// The detector never entered the target section; nothing to append.
    SectionNotFound,
}

// ── Statistics ──────────────────────────────────────────────────────────────

/// Aggregate counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Source files found by the walk (after manifest filtering).
    pub enumerated: usize,
    /// Items skipped because they are already checkpointed.
    pub already_done: usize,
    /// Manifest entries with no file on disk.
    pub missing: usize,
    /// PDFs skipped because their file name is not a usable document id.
    pub rejected: usize,
    /// Items handed to a worker.
    pub dispatched: usize,
    /// Items committed with a result.
    pub succeeded: usize,
    /// Items committed without a result because the section was not found.
    pub section_not_found: usize,
    /// Items committed to the failure log.
    pub failed: usize,
    /// Items whose commit failed; not checkpointed, retried next run.
    pub commit_failed: usize,
    /// Items never dispatched because shutdown was requested.
    pub not_started: usize,
    /// Wall-clock duration of the run.
    pub total_duration_ms: u64,
}

impl BatchStats {
    /// Items that reached a commit (successfully or not).
    pub fn completed(&self) -> usize {
        self.succeeded + self.section_not_found + self.failed + self.commit_failed
    }

    /// Human-readable one-line summary for the operator.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} succeeded, {} section not found, {} failed, {} already done, {} missing",
            self.succeeded, self.section_not_found, self.failed, self.already_done, self.missing
        );
        if self.rejected > 0 {
            line.push_str(&format!(", {} unusable file names", self.rejected));
        }
        if self.commit_failed > 0 {
            line.push_str(&format!(", {} not committed (will retry)", self.commit_failed));
        }
        if self.not_started > 0 {
            line.push_str(&format!(", {} not started (interrupted)", self.not_started));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_path_takes_text_before_first_dot() {
        let id = DocumentId::from_path(Path::new("/data/CN101/CN101234567A.pdf")).unwrap();
        assert_eq!(id.as_str(), "CN101234567A");
        let id = DocumentId::from_path(Path::new("CN1.scan.PDF")).unwrap();
        assert_eq!(id.as_str(), "CN1");
    }

    #[test]
    fn validate_rejects_unloggable_ids() {
        assert!(DocumentId::new("CN101234567A").validate().is_ok());
        assert!(DocumentId::new("").validate().is_err());
        assert!(DocumentId::new("CN1 2A").validate().is_err());
        assert!(DocumentId::new("CN12A|x").validate().is_err());
        assert!(DocumentId::new(" CN12A").validate().is_err());
        assert!(DocumentId::new("CN12A\n").validate().is_err());
    }

    #[test]
    fn canonical_pnr_extracts_token() {
        assert_eq!(canonical_pnr("*CN101234567A-p920mint"), Some("CN101234567A"));
        assert_eq!(canonical_pnr("US123"), None);
    }

    #[test]
    fn record_serialises_flat() {
        let rec = ResultRecord::new(&DocumentId::new("CN1A"))
            .with_field("left", "左")
            .with_field("right", "右");
        let json = serde_json::to_string(&rec).unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["pnr"], "CN1A");
        assert_eq!(v["left"], "左");
        assert_eq!(rec.field("right"), Some("右"));
        // Non-ASCII text is written as UTF-8, not \u escapes.
        assert!(json.contains('左'));
    }

    #[test]
    fn summary_line_mentions_interruptions() {
        let stats = BatchStats {
            succeeded: 3,
            failed: 1,
            not_started: 2,
            ..Default::default()
        };
        let line = stats.summary_line();
        assert!(line.starts_with("3 succeeded"));
        assert!(line.contains("2 not started"));
        assert_eq!(stats.completed(), 4);
    }
}
