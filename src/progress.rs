//! Progress accounting: the shared work-unit counter and document events.
//!
//! Two complementary surfaces:
//!
//! * [`ProgressState`] — a pair of atomics (`processed`, `total`) shared by
//!   every worker and polled by whoever draws the progress bar. Workers only
//!   ever call [`ProgressState::complete_unit`]; the poller only reads.
//!   `percent()` is clamped so an estimate that undershoots never reports
//!   more than 100 %.
//!
//! * [`ExtractionProgressCallback`] — coarse, document-level events (run
//!   start, document start/complete, run complete) pushed by the
//!   orchestrator. Inject it via
//!   [`crate::config::ExtractionConfigBuilder::progress_callback`].
//!
//! # Example
//!
//! ```rust
//! use edgequake_figex::ProgressState;
//!
//! let progress = ProgressState::new(4);
//! progress.complete_unit();
//! assert_eq!(progress.percent(), 25.0);
//! progress.finish();
//! assert!(progress.is_complete());
//! ```

use crate::pipeline::dispatch::Strategy;
use crate::output::DocumentOutcome;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared completion counter for one run.
///
/// `total` is always ≥ 1 and `processed` never decreases within a run.
#[derive(Debug)]
pub struct ProgressState {
    total: AtomicU64,
    processed: AtomicU64,
}

/// A consistent-enough reading of [`ProgressState`] for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    pub percent: f64,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ProgressState {
    /// New counter with the given estimated total (floored at 1).
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total.max(1)),
            processed: AtomicU64::new(0),
        }
    }

    /// Start a new run: zero the counter and install a fresh estimate.
    pub fn reset(&self, total: u64) {
        self.processed.store(0, Ordering::SeqCst);
        self.total.store(total.max(1), Ordering::SeqCst);
    }

    /// Record one finished work unit. Returns the new processed count.
    pub fn complete_unit(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// `processed / total × 100`, clamped to `[0, 100]`.
    pub fn percent(&self) -> f64 {
        percent_of(self.processed(), self.total())
    }

    /// True once `processed ≥ total`.
    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total()
    }

    /// Close the run: afterwards `processed == total`.
    ///
    /// The total is an estimate, so the run may emit fewer or more units than
    /// predicted. Fewer: `processed` is raised to `total`. More: `total` is
    /// raised to `processed`. Neither value ever decreases.
    pub fn finish(&self) {
        let done = self.processed().max(self.total());
        self.total.fetch_max(done, Ordering::SeqCst);
        self.processed.fetch_max(done, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let processed = self.processed();
        let total = self.total();
        ProgressSnapshot {
            processed,
            total,
            percent: percent_of(processed, total),
        }
    }
}

fn percent_of(processed: u64, total: u64) -> f64 {
    let total = total.max(1);
    (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Called by the orchestrator as it moves through the document list.
///
/// Implementations must be `Send + Sync`. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after the work estimate is known.
    ///
    /// # Arguments
    /// * `documents`   — number of input documents
    /// * `total_units` — estimated work units for the progress bar
    fn on_run_start(&self, documents: usize, total_units: u64) {
        let _ = (documents, total_units);
    }

    /// Called when a document's strategy has been chosen.
    ///
    /// # Arguments
    /// * `index`    — 0-based position in the input list
    /// * `path`     — document path
    /// * `strategy` — the acquisition strategy that will run
    fn on_document_start(&self, index: usize, path: &Path, strategy: Strategy) {
        let _ = (index, path, strategy);
    }

    /// Called when every job of a document has finished.
    fn on_document_complete(&self, index: usize, outcome: &DocumentOutcome) {
        let _ = (index, outcome);
    }

    /// Called once after all documents have been attempted.
    ///
    /// # Arguments
    /// * `documents` — documents attempted
    /// * `figures`   — figure files written across the run
    fn on_run_complete(&self, documents: usize, figures: usize) {
        let _ = (documents, figures);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn total_is_floored_at_one() {
        assert_eq!(ProgressState::new(0).total(), 1);
        let p = ProgressState::new(10);
        p.reset(0);
        assert_eq!(p.total(), 1);
    }

    #[test]
    fn percent_is_clamped() {
        let p = ProgressState::new(2);
        for _ in 0..5 {
            p.complete_unit();
        }
        assert_eq!(p.processed(), 5);
        assert_eq!(p.percent(), 100.0);
        assert!(p.is_complete());
    }

    #[test]
    fn reset_zeroes_processed() {
        let p = ProgressState::new(3);
        p.complete_unit();
        p.reset(7);
        assert_eq!(p.processed(), 0);
        assert_eq!(p.total(), 7);
        assert_eq!(p.percent(), 0.0);
    }

    #[test]
    fn finish_after_undershoot_raises_processed() {
        let p = ProgressState::new(10);
        p.complete_unit();
        p.complete_unit();
        p.finish();
        assert_eq!(p.processed(), 10);
        assert_eq!(p.total(), 10);
        assert_eq!(p.percent(), 100.0);
    }

    #[test]
    fn finish_after_overshoot_raises_total() {
        let p = ProgressState::new(2);
        for _ in 0..3 {
            p.complete_unit();
        }
        p.finish();
        assert_eq!(p.processed(), 3);
        assert_eq!(p.total(), 3);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let p = Arc::new(ProgressState::new(800));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        p.complete_unit();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(p.processed(), 800);
        assert!(p.is_complete());
    }

    #[test]
    fn snapshot_matches_state() {
        let p = ProgressState::new(4);
        p.complete_unit();
        let s = p.snapshot();
        assert_eq!(s.processed, 1);
        assert_eq!(s.total, 4);
        assert_eq!(s.percent, 25.0);
    }

    struct CountingCallback {
        started: AtomicUsize,
        finished_docs: AtomicUsize,
    }

    impl ExtractionProgressCallback for CountingCallback {
        fn on_document_start(&self, _index: usize, _path: &Path, _strategy: Strategy) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, documents: usize, _figures: usize) {
            self.finished_docs.store(documents, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2, 12);
        cb.on_document_start(0, Path::new("a.pdf"), Strategy::ExtractEmbedded);
        cb.on_run_complete(2, 0);
    }

    #[test]
    fn arc_dyn_callback_receives_events() {
        let tracker = Arc::new(CountingCallback {
            started: AtomicUsize::new(0),
            finished_docs: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = tracker.clone();
        cb.on_document_start(0, Path::new("a.pdf"), Strategy::RenderThenDetect);
        cb.on_document_start(1, Path::new("b.djvu"), Strategy::ExtractEmbeddedDjvu);
        cb.on_run_complete(2, 5);
        assert_eq!(tracker.started.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.finished_docs.load(Ordering::SeqCst), 2);
    }
}
