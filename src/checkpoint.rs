//! Durable record of which documents reached a terminal outcome.
//!
//! Two newline-delimited logs, one for Success and one for Failure. Each line
//! is `documentId|RFC3339-timestamp[|note]`; older runs wrote a bare
//! `documentId`, which is still accepted. Membership is decided by the first
//! `|` field only.
//!
//! Recovery is replay: on open, every complete line is read into an
//! in-memory set. A trailing fragment without a newline (a write torn by a
//! crash) is ignored and truncated away so the next append starts on a fresh
//! line and the fragment is never mistaken for a record.

use crate::config::LogPaths;
use crate::error::{BatchError, CommitError};
use crate::output::DocumentId;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Note written to the success log for documents without a target section.
pub const SECTION_NOT_FOUND_NOTE: &str = "section-not-found";

const MAX_REASON_CHARS: usize = 200;

// ── Append-only log ──────────────────────────────────────────────────────

/// Byte range of one line written by [`AppendLog::append_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendMark {
    start: u64,
    end: u64,
}

/// A line-oriented append-only file with one long-lived writer lock.
///
/// The log remembers where its last complete line ends. An append that fails
/// part way is cut back to that length, so a short write never leaves a
/// fragment for the next line to be glued onto. If the cut itself fails the
/// log is poisoned and refuses further appends for the rest of the run.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    writer: Mutex<Writer>,
}

#[derive(Debug)]
struct Writer {
    file: File,
    /// End of the last complete line.
    len: u64,
    poisoned: bool,
    #[cfg(test)]
    faults: Faults,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct Faults {
    /// Write only this many bytes of the next line, then fail.
    short_write: Option<usize>,
    /// Fail the rollback that follows.
    rollback: bool,
}

impl Writer {
    async fn write_durably(&mut self, buf: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.faults.short_write.take() {
            self.file.write_all(&buf[..n.min(buf.len())]).await?;
            self.file.flush().await?;
            return Err(io::Error::other("short write"));
        }
        self.file.write_all(buf).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.faults.rollback) {
            return Err(io::Error::other("truncate refused"));
        }
        self.file.set_len(len).await?;
        self.file.sync_data().await?;
        self.len = len;
        Ok(())
    }
}

impl AppendLog {
    /// Open (creating if needed) and return the complete lines already in
    /// the file.
    ///
    /// Only regular files are replayed and repaired; anything else (a pipe,
    /// a device) is opened for appending as is.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<(Self, Vec<String>)> {
        let path = path.into();
        let regular = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        };
        let bytes = if regular {
            match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e),
            }
        } else {
            debug!(path = %path.display(), "Log is not a regular file; skipping replay");
            Vec::new()
        };
        let complete = match bytes.iter().rposition(|b| *b == b'\n') {
            Some(last) => &bytes[..=last],
            None => &[][..],
        };
        let torn = complete.len() < bytes.len();
        let lines = String::from_utf8_lossy(complete)
            .lines()
            .map(str::to_string)
            .collect();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if torn {
            warn!(
                path = %path.display(),
                bytes = bytes.len() - complete.len(),
                "Dropping torn trailing line"
            );
            file.set_len(complete.len() as u64).await?;
            file.sync_data().await?;
        }
        let writer = Writer {
            file,
            len: complete.len() as u64,
            poisoned: false,
            #[cfg(test)]
            faults: Faults::default(),
        };
        Ok((
            Self {
                path,
                writer: Mutex::new(writer),
            },
            lines,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line (a trailing newline is added) and make it durable.
    ///
    /// The whole line is written under the lock so concurrent appenders
    /// never interleave. On error nothing of the line remains in the file,
    /// or the log is poisoned.
    pub async fn append_line(&self, line: &str) -> io::Result<AppendMark> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let mut w = self.writer.lock().await;
        if w.poisoned {
            return Err(io::Error::other(format!(
                "'{}' is closed after an append that could not be rolled back",
                self.path.display()
            )));
        }
        let start = w.len;
        match w.write_durably(&buf).await {
            Ok(()) => {
                w.len = start + buf.len() as u64;
                Ok(AppendMark { start, end: w.len })
            }
            Err(e) => {
                match w.truncate(start).await {
                    Ok(()) => warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Append failed; partial line removed"
                    ),
                    Err(rollback) => {
                        w.poisoned = true;
                        error!(
                            path = %self.path.display(),
                            error = %e,
                            rollback = %rollback,
                            "Append failed and could not be rolled back; log closed for this run"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Remove the line at `mark`, provided nothing was appended after it.
    ///
    /// Returns `false` if a later line exists and the log was left alone.
    pub async fn retract(&self, mark: AppendMark) -> io::Result<bool> {
        let mut w = self.writer.lock().await;
        if w.poisoned || w.len != mark.end {
            return Ok(false);
        }
        if let Err(e) = w.truncate(mark.start).await {
            w.poisoned = true;
            return Err(e);
        }
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) async fn fail_next_append(&self, written: usize, rollback_fails: bool) {
        let mut w = self.writer.lock().await;
        w.faults.short_write = Some(written);
        w.faults.rollback = rollback_fails;
    }
}

// ── Records ──────────────────────────────────────────────────────────────

/// Terminal outcome of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// A result record was committed.
    Success,
    /// Processed without error but the target section was never found.
    /// Logged as a success so it is not retried.
    SectionNotFound,
    /// Processing failed; the reason is kept for the operator.
    Failure(String),
}

impl CheckpointOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckpointOutcome::Failure(_))
    }
}

/// One line of a checkpoint log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub document_id: DocumentId,
    pub outcome: CheckpointOutcome,
    pub timestamp: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(document_id: DocumentId, outcome: CheckpointOutcome) -> Self {
        Self {
            document_id,
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// Render as a log line (without the newline).
    pub fn to_line(&self) -> String {
        let ts = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        match &self.outcome {
            CheckpointOutcome::Success => format!("{}|{}", self.document_id, ts),
            CheckpointOutcome::SectionNotFound => {
                format!("{}|{}|{}", self.document_id, ts, SECTION_NOT_FOUND_NOTE)
            }
            CheckpointOutcome::Failure(reason) => {
                format!("{}|{}|{}", self.document_id, ts, sanitize_reason(reason))
            }
        }
    }

    /// Parse a line from the success (`failure_log = false`) or failure log.
    ///
    /// The id is taken verbatim: a line whose first field is not a valid
    /// [`DocumentId`] (blank, padded, containing whitespace) yields `None`
    /// rather than a different id than the one written. Missing or
    /// unparsable timestamps fall back to the Unix epoch.
    pub fn parse(line: &str, failure_log: bool) -> Option<Self> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut fields = line.splitn(3, '|');
        let document_id = DocumentId::new(fields.next()?);
        document_id.validate().ok()?;
        let timestamp = fields
            .next()
            .and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let note = fields.next().map(str::trim).unwrap_or_default();
        let outcome = if failure_log {
            CheckpointOutcome::Failure(note.to_string())
        } else if note == SECTION_NOT_FOUND_NOTE {
            CheckpointOutcome::SectionNotFound
        } else {
            CheckpointOutcome::Success
        };
        Some(Self {
            document_id,
            outcome,
            timestamp,
        })
    }
}

/// Flatten an error message into a single `|`-free field.
fn sanitize_reason(reason: &str) -> String {
    let flat: String = reason
        .chars()
        .map(|c| if c == '|' || c.is_control() { ' ' } else { c })
        .collect();
    let flat = flat.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(MAX_REASON_CHARS).collect()
}

// ── Store ────────────────────────────────────────────────────────────────

/// Counts replayed from the logs at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// The Success and Failure logs plus their in-memory membership sets.
///
/// The sets only grow; there is no transition back from done.
#[derive(Debug)]
pub struct CheckpointStore {
    success: AppendLog,
    failure: AppendLog,
    succeeded: RwLock<HashSet<DocumentId>>,
    failed: RwLock<HashSet<DocumentId>>,
    replayed: ReplaySummary,
}

impl CheckpointStore {
    /// Open both logs and replay them.
    pub async fn open(paths: &LogPaths) -> Result<Self, BatchError> {
        let (success, ok_lines) = open_log(&paths.success).await?;
        let (failure, failed_lines) = open_log(&paths.failure).await?;

        let succeeded: HashSet<DocumentId> = ok_lines
            .iter()
            .filter_map(|l| CheckpointRecord::parse(l, false))
            .map(|r| r.document_id)
            .collect();
        let failed: HashSet<DocumentId> = failed_lines
            .iter()
            .filter_map(|l| CheckpointRecord::parse(l, true))
            .map(|r| r.document_id)
            .collect();

        let replayed = ReplaySummary {
            succeeded: succeeded.len(),
            failed: failed.len(),
        };
        debug!(
            succeeded = replayed.succeeded,
            failed = replayed.failed,
            "Replayed checkpoint logs"
        );
        Ok(Self {
            success,
            failure,
            succeeded: RwLock::new(succeeded),
            failed: RwLock::new(failed),
            replayed,
        })
    }

    /// Counts as of open time.
    pub fn replayed(&self) -> ReplaySummary {
        self.replayed
    }

    /// True if `id` is in the Success or Failure set.
    pub fn is_done(&self, id: &DocumentId) -> bool {
        read(&self.succeeded).contains(id) || read(&self.failed).contains(id)
    }

    pub fn is_succeeded(&self, id: &DocumentId) -> bool {
        read(&self.succeeded).contains(id)
    }

    /// Union of both sets at this moment.
    pub fn snapshot(&self) -> HashSet<DocumentId> {
        let mut all = read(&self.succeeded).clone();
        all.extend(read(&self.failed).iter().cloned());
        all
    }

    /// Durably append `record` to the matching log, then add it to the set.
    pub async fn mark(&self, record: &CheckpointRecord) -> Result<(), CommitError> {
        let (log, set) = if record.outcome.is_failure() {
            (&self.failure, &self.failed)
        } else {
            (&self.success, &self.succeeded)
        };
        log.append_line(&record.to_line())
            .await
            .map_err(|source| CommitError::CheckpointAppend {
                path: log.path().to_path_buf(),
                source,
            })?;
        set.write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.document_id.clone());
        Ok(())
    }
}

#[cfg(test)]
impl CheckpointStore {
    pub(crate) fn log(&self, failure: bool) -> &AppendLog {
        if failure {
            &self.failure
        } else {
            &self.success
        }
    }
}

async fn open_log(path: &Path) -> Result<(AppendLog, Vec<String>), BatchError> {
    AppendLog::open(path)
        .await
        .map_err(|source| BatchError::LogOpenFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn read(set: &RwLock<HashSet<DocumentId>>) -> std::sync::RwLockReadGuard<'_, HashSet<DocumentId>> {
    set.read().unwrap_or_else(|e| e.into_inner())
}
