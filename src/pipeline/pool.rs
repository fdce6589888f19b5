//! Bounded task pool for blocking jobs.
//!
//! Every job here blocks: an external tool runs for seconds, or a
//! classification pass chews through megapixels. Jobs therefore run on
//! tokio's blocking thread pool via `spawn_blocking`, and a `futures` stream
//! bounds how many are in flight:
//!
//! ```text
//! Parallel:  stream::iter(jobs) ─▶ map(spawn_blocking) ─▶ buffer_unordered(cap)
//! Serial:    stream::iter(jobs) ─▶ then(spawn_blocking)          (one at a time)
//! ```
//!
//! `buffer_unordered` refills a slot the moment any job finishes, so there is
//! no polling loop to reclaim slots, and it drains every remaining job before
//! the stream ends.
//!
//! ## Progress contract
//!
//! Each job completes exactly one work unit on the shared
//! [`ProgressState`], success or failure, including a panicking job.
//! Results come back in completion order; jobs must carry their own identity
//! (page number, image path) instead of reading a shared counter.

use crate::config::ExecutionMode;
use crate::error::JobError;
use crate::progress::ProgressState;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Runs batches of independent blocking jobs under a concurrency cap.
#[derive(Debug, Clone)]
pub struct TaskPool {
    cap: usize,
    mode: ExecutionMode,
    progress: Arc<ProgressState>,
}

impl TaskPool {
    /// `cap` is floored at 1; [`ExecutionMode::Serial`] ignores it.
    pub fn new(cap: usize, mode: ExecutionMode, progress: Arc<ProgressState>) -> Self {
        Self {
            cap: cap.max(1),
            mode,
            progress,
        }
    }

    /// Effective number of jobs allowed in flight.
    pub fn cap(&self) -> usize {
        match self.mode {
            ExecutionMode::Parallel => self.cap,
            ExecutionMode::Serial => 1,
        }
    }

    /// Count a unit that needed no job (unsupported document, missing page count).
    pub fn record_skipped(&self) {
        self.progress.complete_unit();
    }

    /// Run `work` over every job and collect the results.
    ///
    /// Serial mode preserves submission order in the output; parallel mode
    /// returns results in completion order.
    pub async fn run<J, T, F>(&self, jobs: Vec<J>, work: F) -> Vec<Result<T, JobError>>
    where
        J: Send + 'static,
        T: Send + 'static,
        F: Fn(J) -> Result<T, JobError> + Send + Sync + 'static,
    {
        if jobs.is_empty() {
            return Vec::new();
        }
        debug!("Task pool: {} jobs, mode={:?}, cap={}", jobs.len(), self.mode, self.cap());

        let work = Arc::new(work);
        let progress = Arc::clone(&self.progress);
        let job_stream = stream::iter(jobs);

        match self.mode {
            ExecutionMode::Parallel => {
                job_stream
                    .map(|job| run_one(Arc::clone(&work), Arc::clone(&progress), job))
                    .buffer_unordered(self.cap)
                    .collect()
                    .await
            }
            ExecutionMode::Serial => {
                job_stream
                    .then(|job| run_one(Arc::clone(&work), Arc::clone(&progress), job))
                    .collect()
                    .await
            }
        }
    }
}

async fn run_one<J, T, F>(work: Arc<F>, progress: Arc<ProgressState>, job: J) -> Result<T, JobError>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(J) -> Result<T, JobError> + Send + Sync + 'static,
{
    let result = tokio::task::spawn_blocking(move || work(job))
        .await
        .unwrap_or_else(|e| {
            Err(JobError::WorkerPanicked {
                detail: e.to_string(),
            })
        });
    progress.complete_unit();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn pool(cap: usize, mode: ExecutionMode) -> (TaskPool, Arc<ProgressState>) {
        let progress = Arc::new(ProgressState::new(100));
        (TaskPool::new(cap, mode, Arc::clone(&progress)), progress)
    }

    #[tokio::test]
    async fn every_job_counts_once_even_on_failure() {
        let (pool, progress) = pool(4, ExecutionMode::Parallel);
        let results = pool
            .run((0..10).collect(), |i: usize| {
                if i % 3 == 0 {
                    Err(JobError::ToolExecutionFailure {
                        tool: "fake".into(),
                        detail: format!("job {i}"),
                    })
                } else {
                    Ok(i)
                }
            })
            .await;
        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 4);
        assert_eq!(progress.processed(), 10);
    }

    #[tokio::test]
    async fn parallel_respects_the_cap() {
        let (pool, _) = pool(3, ExecutionMode::Parallel);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        pool.run((0..12).collect(), move |_: usize| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {peak}");
    }

    #[tokio::test]
    async fn serial_runs_in_submission_order() {
        let (pool, progress) = pool(8, ExecutionMode::Serial);
        assert_eq!(pool.cap(), 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let results = pool
            .run((0..6).collect(), move |i: usize| {
                s.lock().unwrap().push(i);
                Ok(i * 10)
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(progress.processed(), 6);
    }

    #[tokio::test]
    async fn panicking_job_is_reported_and_counted() {
        let (pool, progress) = pool(2, ExecutionMode::Parallel);
        let results = pool
            .run(vec![1usize, 2], |i: usize| {
                if i == 2 {
                    panic!("boom");
                }
                Ok(i)
            })
            .await;
        assert_eq!(progress.processed(), 2);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(JobError::WorkerPanicked { .. }))));
    }

    #[test]
    fn runs_on_a_current_thread_runtime() {
        let (pool, progress) = pool(4, ExecutionMode::Parallel);
        let results = tokio_test::block_on(pool.run(vec![1usize, 2, 3], |i| Ok(i + 1)));
        let mut values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        values.sort();
        assert_eq!(values, vec![2, 3, 4]);
        assert_eq!(progress.processed(), 3);
    }

    #[tokio::test]
    async fn empty_batch_counts_nothing() {
        let (pool, progress) = pool(2, ExecutionMode::Parallel);
        let results = pool.run(Vec::<usize>::new(), |i| Ok(i)).await;
        assert!(results.is_empty());
        assert_eq!(progress.processed(), 0);
    }
}
