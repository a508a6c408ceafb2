//! Bounded worker pool with crash isolation and a single commit aggregator.
//!
//! ```text
//!  items ─▶ take_while(!shutdown) ─▶ buffer_unordered(workers)
//!                                        │ slot: spawn(process) + timeout
//!                                        ▼
//!                               mpsc<Completion> ─▶ aggregator
//!                                        ▲            │ commit sequence
//!                                        └── ack ◀────┘ progress events
//! ```
//!
//! Each slot runs its document in a separate task so a panic is contained to
//! that item, and waits for the aggregator's acknowledgement before it pulls
//! the next item. When the pool returns, every dispatched item has been
//! committed (or its commit failure recorded).

use crate::checkpoint::CheckpointOutcome;
use crate::commit::{CommitLog, CommitStatus};
use crate::error::{CommitError, ItemError};
use crate::output::{BatchStats, DocumentId, ItemStatus, Processed, WorkItem};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// The per-document process function.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Process one document. Errors become Failure checkpoints.
    async fn process(&self, item: &WorkItem) -> Result<Processed, ItemError>;
}

/// Concurrency and timeout settings for [`run_pool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    /// Wall-clock budget per item.
    pub item_timeout: Duration,
}

/// Cooperative stop flag: once triggered, no new items are dispatched.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Completion {
    item: WorkItem,
    result: Result<Processed, ItemError>,
    ack: oneshot::Sender<()>,
}

/// Process `items` with at most `opts.workers` in flight.
///
/// Returns the per-run counters (`dispatched`, `succeeded`,
/// `section_not_found`, `failed`, `commit_failed`, `not_started`,
/// `already_done` for items that were checkpointed while queued).
pub async fn run_pool(
    items: Vec<WorkItem>,
    opts: &PoolOptions,
    processor: Arc<dyn DocumentProcessor>,
    commit_log: Arc<CommitLog>,
    progress: ProgressCallback,
    shutdown: ShutdownSignal,
) -> BatchStats {
    let start = Instant::now();
    let total = items.len();
    let workers = opts.workers.max(1);
    let item_timeout = opts.item_timeout;
    info!(total, workers, "Starting worker pool");

    let (tx, rx) = mpsc::channel::<Completion>(workers);
    let aggregator = tokio::spawn(aggregate(rx, commit_log, progress.clone(), total));

    let dispatched = Arc::new(AtomicUsize::new(0));
    let stop = shutdown.clone();
    stream::iter(items)
        .take_while(move |_| future::ready(!stop.is_triggered()))
        .map(|mut item| {
            let tx = tx.clone();
            let processor = Arc::clone(&processor);
            let progress = Arc::clone(&progress);
            let dispatched = Arc::clone(&dispatched);
            async move {
                dispatched.fetch_add(1, Ordering::SeqCst);
                item.status = ItemStatus::InProgress;
                progress.on_item_start(&item.id);

                let result = run_isolated(processor, item.clone(), item_timeout).await;

                let (ack_tx, ack_rx) = oneshot::channel();
                let completion = Completion {
                    item,
                    result,
                    ack: ack_tx,
                };
                if tx.send(completion).await.is_ok() {
                    let _ = ack_rx.await;
                }
            }
        })
        .buffer_unordered(workers)
        .for_each(|_| future::ready(()))
        .await;
    drop(tx);

    let mut stats = match aggregator.await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "Commit aggregator terminated abnormally");
            BatchStats::default()
        }
    };
    stats.dispatched = dispatched.load(Ordering::SeqCst);
    stats.not_started = total.saturating_sub(stats.dispatched);
    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    if shutdown.is_triggered() {
        warn!(not_started = stats.not_started, "Pool stopped early on shutdown request");
    }
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        section_not_found = stats.section_not_found,
        "Worker pool drained"
    );
    stats
}

/// Run one item in its own task under the timeout.
async fn run_isolated(
    processor: Arc<dyn DocumentProcessor>,
    item: WorkItem,
    item_timeout: Duration,
) -> Result<Processed, ItemError> {
    let handle = tokio::spawn(async move { processor.process(&item).await });
    let abort = handle.abort_handle();
    match tokio::time::timeout(item_timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) if join.is_panic() => Err(ItemError::Panicked(panic_message(join.into_panic()))),
        Ok(Err(join)) => Err(ItemError::Internal(join.to_string())),
        Err(_) => {
            // Dropping the future kills a running OCR child process.
            abort.abort();
            Err(ItemError::Timeout {
                secs: item_timeout.as_secs(),
            })
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The single consumer of completion events. Owns all counters.
async fn aggregate(
    mut rx: mpsc::Receiver<Completion>,
    commit_log: Arc<CommitLog>,
    progress: ProgressCallback,
    total: usize,
) -> BatchStats {
    let mut stats = BatchStats::default();
    let mut completed = 0usize;

    while let Some(Completion { mut item, result, ack }) = rx.recv().await {
        let (record, outcome) = match result {
            Ok(Processed::Record(record)) => (Some(record), CheckpointOutcome::Success),
            Ok(Processed::SectionNotFound) => (None, CheckpointOutcome::SectionNotFound),
            Err(e) => {
                warn!(doc = %item.id, path = %item.source_path.display(), error = %e, "Document failed");
                (None, CheckpointOutcome::Failure(e.to_string()))
            }
        };

        let committed = commit_log.commit(&item.id, record.as_ref(), outcome.clone()).await;
        completed += 1;
        item.status = settled_status(&committed, &outcome);
        debug!(doc = %item.id, status = ?item.status, "Item settled");
        match committed {
            Ok(CommitStatus::Committed) => {
                match &outcome {
                    CheckpointOutcome::Success => stats.succeeded += 1,
                    CheckpointOutcome::SectionNotFound => {
                        info!(doc = %item.id, "No description section found");
                        stats.section_not_found += 1;
                    }
                    CheckpointOutcome::Failure(_) => stats.failed += 1,
                }
                report(&progress, &item.id, &outcome, completed, total);
            }
            Ok(CommitStatus::AlreadyDone) => {
                stats.already_done += 1;
                report(&progress, &item.id, &outcome, completed, total);
            }
            Err(e) => {
                error!(doc = %item.id, error = %e, "Commit failed; document stays outstanding");
                stats.commit_failed += 1;
                progress.on_item_error(&item.id, &e.to_string(), completed, total);
            }
        }
        let _ = ack.send(());
    }
    stats
}

/// Where an item ends up once its commit has been attempted.
fn settled_status(
    committed: &Result<CommitStatus, CommitError>,
    outcome: &CheckpointOutcome,
) -> ItemStatus {
    match committed {
        Ok(CommitStatus::Committed) if outcome.is_failure() => ItemStatus::Failed,
        Ok(_) => ItemStatus::Done,
        Err(_) => ItemStatus::Failed,
    }
}

fn report(
    progress: &ProgressCallback,
    id: &DocumentId,
    outcome: &CheckpointOutcome,
    completed: usize,
    total: usize,
) {
    match outcome {
        CheckpointOutcome::Failure(reason) => progress.on_item_error(id, reason, completed, total),
        _ => progress.on_item_complete(id, outcome, completed, total),
    }
}
