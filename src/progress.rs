//! Progress-callback trait for per-chunk extraction events.
//!
//! Pass any `&dyn ExtractionProgressCallback` to
//! [`crate::batch::extract_chunks`] to receive events as each chunk is sent to
//! the model. Hosts that share one callback across tasks hold it as a
//! [`ProgressCallback`] and pass `progress.as_ref()`. The CLI uses it to drive
//! a terminal progress bar; other hosts can forward events to a channel or a
//! log without the library knowing how.
//!
//! # Example
//!
//! ```rust
//! use textbook_kg::ExtractionProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     relations: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, _index: usize, _total: usize, _entities: usize, relations: usize) {
//!         self.relations.fetch_add(relations, Ordering::SeqCst);
//!     }
//! }
//!
//! let cb = CountingCallback { relations: AtomicUsize::new(0) };
//! cb.on_chunk_complete(1, 10, 4, 2);
//! assert_eq!(cb.relations.load(Ordering::SeqCst), 2);
//! ```

use std::sync::Arc;

/// Called by the extraction stage as it processes each chunk.
///
/// All methods default to no-ops so callers only override what they need.
/// Chunk indices are 1-based.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first chunk is sent.
    fn on_run_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    fn on_chunk_start(&self, index: usize, total: usize, chunk_id: &str) {
        let _ = (index, total, chunk_id);
    }

    /// Called after a chunk's result has been validated and persisted.
    fn on_chunk_complete(&self, index: usize, total: usize, entities: usize, relations: usize) {
        let _ = (index, total, entities, relations);
    }

    /// Called when every attempt for a chunk failed and it degraded to an
    /// empty result. Always followed by `on_chunk_complete` for the same chunk.
    fn on_chunk_degraded(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every chunk has been attempted.
    fn on_run_complete(&self, total: usize, degraded: usize) {
        let _ = (total, degraded);
    }
}

/// Callback that ignores every event.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        started_total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        degraded: AtomicUsize,
        entities: AtomicUsize,
        finished_degraded: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_run_start(&self, total_chunks: usize) {
            self.started_total.store(total_chunks, Ordering::SeqCst);
        }

        fn on_chunk_start(&self, _index: usize, _total: usize, _chunk_id: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, _index: usize, _total: usize, entities: usize, _relations: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.entities.fetch_add(entities, Ordering::SeqCst);
        }

        fn on_chunk_degraded(&self, _index: usize, _total: usize, _error: &str) {
            self.degraded.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, degraded: usize) {
            self.finished_degraded.store(degraded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_chunk_start(1, 5, "doc-p1-c1");
        cb.on_chunk_degraded(1, 5, "HTTP 500");
        cb.on_chunk_complete(1, 5, 0, 0);
        cb.on_run_complete(5, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_run_start(2);
        tracker.on_chunk_start(1, 2, "a-p1-c1");
        tracker.on_chunk_complete(1, 2, 3, 1);
        tracker.on_chunk_start(2, 2, "a-p1-c2");
        tracker.on_chunk_degraded(2, 2, "timeout");
        tracker.on_chunk_complete(2, 2, 0, 0);
        tracker.on_run_complete(2, 1);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.degraded.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.entities.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.finished_degraded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_chunk_complete(1, 10, 2, 1);
    }
}
