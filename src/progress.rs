//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the worker pool commits each document.
//!
//! Completion and error events are emitted by the pool's single aggregator
//! after the item's commit sequence has finished, so `completed` grows by one
//! per call and never goes backwards. `on_item_start` is called from the
//! worker slots and may arrive concurrently.
//!
//! # Example
//!
//! ```rust
//! use patocr::{BatchConfig, BatchProgressCallback, CheckpointOutcome, DocumentId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, id: &DocumentId, _: &CheckpointOutcome, completed: usize, total: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id} done ({completed}/{total})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = BatchConfig::builder("/data/pdfs", "./ocr_results")
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::checkpoint::CheckpointOutcome;
use crate::output::{BatchStats, DocumentId};
use std::sync::Arc;

/// Called by the worker pool as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before any document is dispatched.
    ///
    /// # Arguments
    /// * `total`       : documents that will be dispatched this run
    /// * `already_done`: documents skipped because they are checkpointed
    fn on_batch_start(&self, total: usize, already_done: usize) {
        let _ = (total, already_done);
    }

    /// Called when a worker picks up a document.
    fn on_item_start(&self, id: &DocumentId) {
        let _ = id;
    }

    /// Called after a document was committed with a Success or
    /// SectionNotFound checkpoint.
    fn on_item_complete(
        &self,
        id: &DocumentId,
        outcome: &CheckpointOutcome,
        completed: usize,
        total: usize,
    ) {
        let _ = (id, outcome, completed, total);
    }

    /// Called after a document failed (processing or commit).
    ///
    /// # Arguments
    /// * `error`: human-readable cause
    fn on_item_error(&self, id: &DocumentId, error: &str, completed: usize, total: usize) {
        let _ = (id, error, completed, total);
    }

    /// Called once after the pool has drained.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        last_completed: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize, _already_done: usize) {
            self.total.store(total, Ordering::SeqCst);
        }

        fn on_item_start(&self, _id: &DocumentId) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _: &DocumentId, _: &CheckpointOutcome, completed: usize, _: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.last_completed.store(completed, Ordering::SeqCst);
        }

        fn on_item_error(&self, _: &DocumentId, _: &str, completed: usize, _: usize) {
            self.errors.fetch_add(1, Ordering::SeqCst);
            self.last_completed.store(completed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let id = DocumentId::new("CN1A");
        cb.on_batch_start(5, 1);
        cb.on_item_start(&id);
        cb.on_item_complete(&id, &CheckpointOutcome::Success, 1, 5);
        cb.on_item_error(&id, "boom", 2, 5);
        cb.on_batch_complete(&BatchStats::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let a = DocumentId::new("CN1A");
        let b = DocumentId::new("CN2B");

        tracker.on_batch_start(2, 0);
        assert_eq!(tracker.total.load(Ordering::SeqCst), 2);

        tracker.on_item_start(&a);
        tracker.on_item_start(&b);
        tracker.on_item_complete(&a, &CheckpointOutcome::SectionNotFound, 1, 2);
        tracker.on_item_error(&b, "OCR engine exited with 1", 2, 2);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.last_completed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10, 0);
        cb.on_item_start(&DocumentId::new("CN1A"));
    }
}
