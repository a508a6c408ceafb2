//! The per-item commit sequence.
//!
//! ```text
//!  0. already checkpointed?  → skip
//!  1. append result (if any) → result log      (fsync)
//!  2. append checkpoint      → success/failure (fsync)
//!  3. insert into the in-memory done set
//! ```
//!
//! If step 2 fails the result from step 1 is truncated away again, so a
//! failed commit leaves the document in neither log and the next run redoes
//! it cleanly. A crash between 1 and 2 still leaves a result without a
//! checkpoint; the next run redoes the document and appends a second,
//! identical result. A
//! checkpoint is never written before its result, so a Success checkpoint
//! always has a durable record behind it.

use crate::checkpoint::{CheckpointOutcome, CheckpointRecord, CheckpointStore};
use crate::config::LogPaths;
use crate::error::{BatchError, CommitError};
use crate::output::{DocumentId, ResultRecord};
use crate::sink::ResultSink;
use tracing::{debug, warn};

/// Whether [`CommitLog::commit`] wrote anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// The document already had a checkpoint; nothing was written.
    AlreadyDone,
}

/// Result sink and checkpoint store behind one commit operation.
#[derive(Debug)]
pub struct CommitLog {
    results: ResultSink,
    checkpoints: CheckpointStore,
}

impl CommitLog {
    pub fn new(results: ResultSink, checkpoints: CheckpointStore) -> Self {
        Self {
            results,
            checkpoints,
        }
    }

    /// Open all three logs for `paths`.
    pub async fn open(paths: &LogPaths) -> Result<Self, BatchError> {
        let checkpoints = CheckpointStore::open(paths).await?;
        let results = ResultSink::open(&paths.results).await?;
        Ok(Self::new(results, checkpoints))
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run the commit sequence for one document.
    ///
    /// `result` is ignored for Failure outcomes.
    pub async fn commit(
        &self,
        id: &DocumentId,
        result: Option<&ResultRecord>,
        outcome: CheckpointOutcome,
    ) -> Result<CommitStatus, CommitError> {
        if self.checkpoints.is_done(id) {
            return Ok(CommitStatus::AlreadyDone);
        }
        let appended = match (result, outcome.is_failure()) {
            (Some(record), false) => Some(self.results.append(record).await?),
            _ => None,
        };
        let marked = self
            .checkpoints
            .mark(&CheckpointRecord::new(id.clone(), outcome))
            .await;
        if let (Err(e), Some(mark)) = (&marked, appended) {
            // Leave neither log holding the document, so the redo adds no duplicate.
            match self.results.retract(mark).await {
                Ok(true) => debug!(doc = %id, "Result retracted after checkpoint failure"),
                Ok(false) => warn!(doc = %id, error = %e, "Result kept without checkpoint"),
                Err(re) => warn!(doc = %id, error = %re, "Result retraction failed"),
            }
        }
        marked?;
        Ok(CommitStatus::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMode;
    use crate::error::CommitError;
    use crate::sink::read_result_log;
    use tempfile::TempDir;

    #[tokio::test]
    async fn success_writes_result_then_checkpoint() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths::for_mode(dir.path(), ExtractionMode::Description);
        let log = CommitLog::open(&paths).await.unwrap();
        let id = DocumentId::new("CN1A");
        let rec = ResultRecord::new(&id).with_field("description", "正文");

        let status = log.commit(&id, Some(&rec), CheckpointOutcome::Success).await.unwrap();
        assert_eq!(status, CommitStatus::Committed);
        assert!(log.checkpoints().is_succeeded(&id));
        assert_eq!(read_result_log(&paths.results).await.unwrap().records, vec![rec]);
    }

    #[tokio::test]
    async fn second_commit_is_skipped() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths::for_mode(dir.path(), ExtractionMode::FrontPage);
        let log = CommitLog::open(&paths).await.unwrap();
        let id = DocumentId::new("CN1A");
        let rec = ResultRecord::new(&id).with_field("left", "l");

        log.commit(&id, Some(&rec), CheckpointOutcome::Success).await.unwrap();
        let again = log
            .commit(&id, Some(&rec), CheckpointOutcome::Failure("late".into()))
            .await
            .unwrap();
        assert_eq!(again, CommitStatus::AlreadyDone);
        assert_eq!(std::fs::read_to_string(&paths.success).unwrap().lines().count(), 1);
        assert_eq!(std::fs::read_to_string(&paths.failure).unwrap(), "");
        assert_eq!(read_result_log(&paths.results).await.unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn failure_writes_no_result() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths::for_mode(dir.path(), ExtractionMode::Description);
        let log = CommitLog::open(&paths).await.unwrap();
        let id = DocumentId::new("CN2B");
        let rec = ResultRecord::new(&id);

        log.commit(&id, Some(&rec), CheckpointOutcome::Failure("corrupt".into()))
            .await
            .unwrap();
        assert!(log.checkpoints().is_done(&id));
        assert!(!log.checkpoints().is_succeeded(&id));
        assert!(read_result_log(&paths.results).await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn failed_result_append_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths::for_mode(dir.path(), ExtractionMode::Description);
        let log = CommitLog::open(&paths).await.unwrap();
        let id = DocumentId::new("CN1A");
        let rec = ResultRecord::new(&id).with_field("description", "正文");

        log.results.log().fail_next_append(7, false).await;
        let err = log.commit(&id, Some(&rec), CheckpointOutcome::Success).await.unwrap_err();
        assert!(matches!(err, CommitError::ResultAppend { .. }), "{err}");
        assert!(!log.checkpoints().is_done(&id));
        assert_eq!(std::fs::read_to_string(&paths.results).unwrap(), "");
        assert_eq!(std::fs::read_to_string(&paths.success).unwrap(), "");

        // A retry in the same run goes through.
        log.commit(&id, Some(&rec), CheckpointOutcome::Success).await.unwrap();
        assert_eq!(read_result_log(&paths.results).await.unwrap().records, vec![rec]);
    }

    #[tokio::test]
    async fn failed_checkpoint_append_retracts_the_result() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths::for_mode(dir.path(), ExtractionMode::Description);
        let id = DocumentId::new("CN2B");
        let rec = ResultRecord::new(&id).with_field("description", "正文");
        {
            let log = CommitLog::open(&paths).await.unwrap();
            log.checkpoints().log(false).fail_next_append(2, false).await;
            let err = log.commit(&id, Some(&rec), CheckpointOutcome::Success).await.unwrap_err();
            assert!(matches!(err, CommitError::CheckpointAppend { .. }), "{err}");
            assert!(!log.checkpoints().is_done(&id));
        }

        assert!(read_result_log(&paths.results).await.unwrap().records.is_empty());
        assert_eq!(std::fs::read_to_string(&paths.success).unwrap(), "");
        let reopened = CommitLog::open(&paths).await.unwrap();
        assert!(!reopened.checkpoints().is_done(&id));
    }
}
