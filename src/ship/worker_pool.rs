// src/ship/worker_pool.rs
//! Harvest worker pool
//!
//! The controller hands each snapshot to this pool so the next harvest
//! interval is not held up by decoding and shipping. Jobs run in submission
//! order per worker but may finish out of order across workers.
//!
//! ```text
//! controller ─► submit(job) ─► [unbounded queue] ─► worker 0
//!                                               └─► worker 1
//! ```

use crate::utils::errors::{DaemonError, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of harvest workers
pub const DEFAULT_WORKERS: usize = 2;

type Job = BoxFuture<'static, ()>;

/// Fixed-size pool of async workers
pub struct HarvestWorkerPool {
    sender: Option<mpsc::UnboundedSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolCounters>,
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl HarvestWorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(PoolCounters::default());

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        job.await;
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!("Harvest worker {} stopped", id);
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            stats,
        }
    }

    /// Queue a job. Fails once the pool is shutting down.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(DaemonError::QueueClosed)?;
        sender.send(Box::pin(job)).map_err(|_| DaemonError::QueueClosed)?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers.len(),
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work, then wait for queued and running jobs.
    pub async fn shutdown(mut self) {
        info!("Shutting down harvest workers");
        self.sender.take();

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("Harvest worker ended abnormally: {}", e);
            }
        }
        info!("Harvest workers drained ({} jobs)", self.stats.completed.load(Ordering::Relaxed));
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub submitted: u64,
    pub completed: u64,
}

impl PoolStats {
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.completed)
    }
}
