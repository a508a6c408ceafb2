//! Maintenance passes over existing logs.
//!
//! * [`reconcile_checkpoints`] repairs the one state the commit sequence can
//!   leave behind after a crash: a result in the result log with no success
//!   checkpoint. Without it the next run would OCR the document again and
//!   append a duplicate result.
//! * [`find_continuations`] lists front-page results whose columns say the
//!   front page continues on page 2 (`续页`), producing a manifest for a
//!   `front-page-continued` run.

use crate::checkpoint::{CheckpointOutcome, CheckpointRecord, CheckpointStore};
use crate::config::LogPaths;
use crate::error::{BatchError, CommitError};
use crate::output::{canonical_pnr, DocumentId, ResultRecord};
use crate::sink::read_result_log;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Marker printed on front pages that continue on the next page.
pub const CONTINUATION_MARKER: &str = "续页";

/// Outcome of [`reconcile_checkpoints`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records read from the result log.
    pub records: usize,
    /// Success checkpoints written for results that had none.
    pub recovered: Vec<DocumentId>,
    /// Records whose document appears more than once in the result log.
    pub duplicate_results: usize,
    /// Lines of the result log that could not be parsed.
    pub malformed_lines: usize,
}

/// Document id of a result record, tolerating noise around the number.
pub fn record_id(record: &ResultRecord) -> Option<DocumentId> {
    let id = canonical_pnr(&record.pnr).unwrap_or_else(|| record.pnr.trim());
    let id = DocumentId::from(id);
    id.validate().ok().map(|_| id)
}

/// Write a success checkpoint for every result lacking one.
pub async fn reconcile_checkpoints(paths: &LogPaths) -> Result<ReconcileReport, BatchError> {
    let contents = read_result_log(&paths.results)
        .await
        .map_err(|source| BatchError::LogOpenFailed {
            path: paths.results.clone(),
            source,
        })?;
    let store = CheckpointStore::open(paths).await?;

    let mut report = ReconcileReport {
        records: contents.records.len(),
        malformed_lines: contents.malformed_lines,
        ..Default::default()
    };
    let mut seen = HashSet::new();
    for record in &contents.records {
        let Some(id) = record_id(record) else {
            warn!(pnr = %record.pnr, "Result has an unusable pnr");
            continue;
        };
        if !seen.insert(id.clone()) {
            report.duplicate_results += 1;
            continue;
        }
        if store.is_done(&id) {
            continue;
        }
        store
            .mark(&CheckpointRecord::new(id.clone(), CheckpointOutcome::Success))
            .await
            .map_err(commit_to_batch)?;
        report.recovered.push(id);
    }
    info!(
        records = report.records,
        recovered = report.recovered.len(),
        duplicates = report.duplicate_results,
        "Reconciled checkpoints with results"
    );
    Ok(report)
}

fn commit_to_batch(e: CommitError) -> BatchError {
    match e {
        CommitError::CheckpointAppend { path, source } | CommitError::ResultAppend { path, source } => {
            BatchError::ReportWriteFailed { path, source }
        }
        CommitError::Serialize(e) => BatchError::Internal(e.to_string()),
    }
}

/// True if any front-page column mentions the continuation marker.
///
/// OCR often splits `续页` with spaces, so whitespace is removed first.
pub fn continues_on_next_page(record: &ResultRecord) -> bool {
    ["left", "right", "left1", "right1"]
        .iter()
        .filter_map(|f| record.field(f))
        .any(|text| {
            let squeezed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            squeezed.contains(CONTINUATION_MARKER)
        })
}

/// Scan a front-page result log and write the ids of continued documents
/// to `manifest_out`, one per line, sorted.
pub async fn find_continuations(results: &Path, manifest_out: &Path) -> Result<Vec<DocumentId>, BatchError> {
    let contents = read_result_log(results)
        .await
        .map_err(|source| BatchError::LogOpenFailed {
            path: results.to_path_buf(),
            source,
        })?;
    let ids: BTreeSet<DocumentId> = contents
        .records
        .iter()
        .filter(|r| continues_on_next_page(r))
        .filter_map(record_id)
        .collect();
    let ids: Vec<DocumentId> = ids.into_iter().collect();

    crate::discover::write_id_list(manifest_out, &ids).await?;
    info!(
        scanned = contents.records.len(),
        continued = ids.len(),
        manifest = %manifest_out.display(),
        "Continuation scan complete"
    );
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMode;
    use crate::sink::ResultSink;
    use tempfile::TempDir;

    #[tokio::test]
    async fn recovers_results_without_checkpoint() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths::for_mode(dir.path(), ExtractionMode::Description);
        {
            let sink = ResultSink::open(&paths.results).await.unwrap();
            for pnr in ["CN1A", "CN2B", "*CN3C-old", "CN2B"] {
                sink.append(&ResultRecord {
                    pnr: pnr.into(),
                    fields: Default::default(),
                })
                .await
                .unwrap();
            }
            let store = CheckpointStore::open(&paths).await.unwrap();
            store
                .mark(&CheckpointRecord::new("CN1A".into(), CheckpointOutcome::Success))
                .await
                .unwrap();
        }

        let report = reconcile_checkpoints(&paths).await.unwrap();
        assert_eq!(report.records, 4);
        assert_eq!(report.recovered, vec![DocumentId::new("CN2B"), DocumentId::new("CN3C")]);
        assert_eq!(report.duplicate_results, 1);

        let again = reconcile_checkpoints(&paths).await.unwrap();
        assert!(again.recovered.is_empty());
        let success = std::fs::read_to_string(&paths.success).unwrap();
        assert_eq!(success.lines().count(), 3);
    }

    #[test]
    fn continuation_marker_tolerates_spaces() {
        let yes = ResultRecord::new(&"CN1A".into()).with_field("left", "（见 续 页）").with_field("right", "");
        let no = ResultRecord::new(&"CN2B".into()).with_field("left", "摘要").with_field("right", "续");
        assert!(continues_on_next_page(&yes));
        assert!(!continues_on_next_page(&no));
    }

    #[tokio::test]
    async fn continuation_manifest_is_sorted() {
        let dir = TempDir::new().unwrap();
        let results = dir.path().join("frontpage.jsonl");
        std::fs::write(
            &results,
            concat!(
                "{\"pnr\":\"CN9Z\",\"left\":\"续页\",\"right\":\"\"}\n",
                "[{\"pnr\":\"CN1A\",\"left\":\"\",\"right\":\"续 页\"},{\"pnr\":\"CN5E\",\"left\":\"x\",\"right\":\"y\"}]\n",
            ),
        )
        .unwrap();
        let out = dir.path().join("second_pg.txt");
        let ids = find_continuations(&results, &out).await.unwrap();
        assert_eq!(ids, vec![DocumentId::new("CN1A"), DocumentId::new("CN9Z")]);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "CN1A\nCN9Z\n");
    }
}
