//! Download workers
//!
//! A pool of tasks pulling `DownloadJob`s from the task queue. Each job is
//! fetched, checked against the dedup store, written under its keyword
//! partition and validated; failures drop the job. Workers stop on a
//! broadcast shutdown signal, checked between pops, so shutdown takes up to
//! one queue wait and a job already popped is always finished.

pub mod validator;
pub mod worker;

pub use validator::{ImageValidator, Rejection};
pub use worker::{clean_extension, timestamp_file_name, DownloadWorker, JobOutcome};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::TaskQueue;

/// Outcome tallies across every worker of a pool
#[derive(Debug, Default)]
struct PoolCounters {
    saved: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    active: AtomicUsize,
}

impl PoolCounters {
    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Saved(_) => &self.saved,
            JobOutcome::Duplicate => &self.duplicates,
            JobOutcome::Rejected(_) => &self.rejected,
            JobOutcome::FetchFailed(_) | JobOutcome::StoreFailed(_) | JobOutcome::WriteFailed(_) => {
                &self.failed
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub saved: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub failed: u64,
    /// Jobs currently being processed
    pub active: usize,
}

impl PoolStats {
    pub fn processed(&self) -> u64 {
        self.saved + self.duplicates + self.rejected + self.failed
    }
}

/// Running set of download worker tasks
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Spawn `workers` tasks on the current runtime.
    ///
    /// Each task subscribes to `shutdown`; sending on it (or dropping every
    /// sender) stops the pool once in-flight pops and jobs finish.
    pub fn start(
        worker: Arc<DownloadWorker>,
        queue: Arc<dyn TaskQueue>,
        workers: usize,
        queue_wait: Duration,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let counters = Arc::new(PoolCounters::default());
        let handles = (0..workers)
            .map(|id| {
                let task = WorkerTask {
                    id,
                    worker: Arc::clone(&worker),
                    queue: Arc::clone(&queue),
                    counters: Arc::clone(&counters),
                    queue_wait,
                };
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move { task.run(shutdown).await })
            })
            .collect();

        info!(
            "Download pool started ({} workers, queue: {}, output: {})",
            workers,
            queue.name(),
            worker.base_path().display()
        );
        Self { handles, counters }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            saved: self.counters.saved.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::SeqCst),
        }
    }

    /// True while any worker holds a job
    pub fn is_busy(&self) -> bool {
        self.counters.active.load(Ordering::SeqCst) > 0
    }

    /// Wait for every worker to exit (after shutdown was signalled)
    pub async fn join(self) -> PoolStats {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Download worker task failed: {}", e);
            }
        }
        let stats = PoolStats {
            saved: self.counters.saved.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            active: 0,
        };
        info!(
            "Download pool stopped: {} saved, {} duplicates, {} rejected, {} failed",
            stats.saved, stats.duplicates, stats.rejected, stats.failed
        );
        stats
    }
}

struct WorkerTask {
    id: usize,
    worker: Arc<DownloadWorker>,
    queue: Arc<dyn TaskQueue>,
    counters: Arc<PoolCounters>,
    queue_wait: Duration,
}

impl WorkerTask {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!("Download worker {} started", self.id);
        loop {
            // Checked between pops only: a pop already sent to a shared
            // backend may have taken a job that must still be finished
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            match self.queue.pop(self.queue_wait).await {
                Ok(Some(job)) => {
                    self.counters.active.fetch_add(1, Ordering::SeqCst);
                    let outcome = self.worker.handle(&job).await;
                    self.counters.record(&outcome);
                    self.counters.active.fetch_sub(1, Ordering::SeqCst);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Download worker {} failed to pop a job: {}", self.id, e);
                    tokio::time::sleep(self.queue_wait).await;
                }
            }
        }
        debug!("Download worker {} stopped", self.id);
    }
}
