//! Queue-draining worker pool.
//!
//! Workers read jobs from a [`TileQueue`], hand each coordinate to a
//! [`JobProcessor`], and acknowledge only the jobs that processed
//! successfully. A failed job is left unacknowledged so a durable queue
//! redelivers it after its visibility window. In daemon mode workers
//! poll forever; otherwise they exit once a read comes back empty.

use crate::coord::Coord;
use crate::queue::TileQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Work performed for a single tile coordinate.
///
/// Implementations run on several worker threads at once and must be
/// safe to call concurrently.
pub trait JobProcessor: Send + Sync {
    /// Processes one coordinate.
    ///
    /// # Errors
    ///
    /// Returns a [`JobFailure`] when the tile could not be processed;
    /// the job stays on the queue for redelivery.
    fn process(&self, coord: Coord) -> Result<(), JobFailure>;
}

/// Why a single job could not be processed.
#[derive(Debug, thiserror::Error)]
#[error("job failed: {reason}")]
pub struct JobFailure {
    pub reason: String,
}

impl JobFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Worker threads to spawn
    pub workers: usize,
    /// Jobs requested per queue read
    pub messages_at_once: usize,
    /// How long a read blocks waiting for work
    pub read_timeout: Duration,
    /// Keep polling after the queue drains instead of exiting
    pub daemon: bool,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            messages_at_once: 10,
            read_timeout: Duration::from_secs(20),
            daemon: false,
        }
    }
}

/// Job counters accumulated across all workers.
#[derive(Debug, Default)]
struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Final counters from a finished pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: u64,
    pub failed: u64,
}

/// A pool of threads draining one queue through one processor.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// Spawns the configured number of worker threads.
    pub fn start(
        config: WorkerPoolConfig,
        queue: Arc<dyn TileQueue>,
        processor: Arc<dyn JobProcessor>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::default());
        info!(
            workers = config.workers,
            daemon = config.daemon,
            "starting worker pool"
        );

        let handles = (0..config.workers.max(1))
            .map(|worker_id| {
                let config = config.clone();
                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                let shutdown = Arc::clone(&shutdown);
                let stats = Arc::clone(&stats);
                thread::Builder::new()
                    .name(format!("tile-worker-{worker_id}"))
                    .spawn(move || {
                        worker_loop(worker_id, &config, &*queue, &*processor, &shutdown, &stats);
                    })
                    .expect("spawning a worker thread")
            })
            .collect();

        Self {
            handles,
            shutdown,
            stats,
        }
    }

    /// Waits for every worker to exit on its own. Only meaningful for
    /// non-daemon pools, which stop once the queue is drained.
    pub fn join(self) -> WorkerSummary {
        for handle in self.handles {
            let _ = handle.join();
        }
        WorkerSummary {
            processed: self.stats.processed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Signals every worker to stop after its current job and waits for
    /// them.
    pub fn shutdown(self) -> WorkerSummary {
        self.shutdown.store(true, Ordering::Release);
        self.join()
    }
}

fn worker_loop(
    worker_id: usize,
    config: &WorkerPoolConfig,
    queue: &dyn TileQueue,
    processor: &dyn JobProcessor,
    shutdown: &AtomicBool,
    stats: &WorkerStats,
) {
    while !shutdown.load(Ordering::Acquire) {
        let jobs = match queue.read(config.messages_at_once, config.read_timeout) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(worker = worker_id, error = %err, "queue read failed; worker stopping");
                break;
            }
        };
        if jobs.is_empty() {
            if config.daemon {
                continue;
            }
            debug!(worker = worker_id, "queue drained; worker exiting");
            break;
        }
        for job in jobs {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            match processor.process(job.coord) {
                Ok(()) => {
                    stats.processed.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = queue.ack(job.handle) {
                        warn!(worker = worker_id, coord = %job.coord, error = %err, "ack failed");
                    }
                }
                Err(err) => {
                    // No ack: the queue redelivers after the visibility window.
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(worker = worker_id, coord = %job.coord, error = %err, "job failed");
                }
            }
        }
    }
}
