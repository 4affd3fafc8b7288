//! Integration tests for the expired-tile propagation workflow.
//!
//! These tests exercise the complete pipeline against the durable
//! backends: an expired file on disk, a disk cache index, a spool-backed
//! queue, and a worker pool draining the result.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tilecascade::coord::Coord;
use tilecascade::index::{make_cache_index, CacheIndex, IndexKind, Progress};
use tilecascade::pipeline::{propagate, PropagateConfig};
use tilecascade::queue::{DurableQueue, TileQueue};
use tilecascade::worker::{JobFailure, JobProcessor, WorkerPool, WorkerPoolConfig};

// =============================================================================
// Test Helpers
// =============================================================================

fn coord(zoom: u8, column: u64, row: u64) -> Coord {
    Coord::new(zoom, column, row).unwrap()
}

/// Lays out a scratch workspace: expired file, index directory, spool.
struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new(expired_lines: &str) -> Self {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("expired.txt"), expired_lines).unwrap();
        Self { root }
    }

    fn expired_file(&self) -> std::path::PathBuf {
        self.root.path().join("expired.txt")
    }

    fn index(&self) -> Box<dyn CacheIndex> {
        let kind = IndexKind::Disk {
            directory: self.root.path().join("index"),
        };
        make_cache_index(&kind, "tiles").unwrap()
    }

    fn queue(&self) -> DurableQueue {
        DurableQueue::open(self.root.path().join("spool"), Duration::from_secs(30)).unwrap()
    }
}

/// Records every coordinate it is handed.
#[derive(Default)]
struct Collector {
    coords: Mutex<Vec<Coord>>,
    failures_left: AtomicUsize,
}

impl JobProcessor for Collector {
    fn process(&self, coord: Coord) -> Result<(), JobFailure> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(JobFailure::new("simulated render failure"));
        }
        self.coords.lock().unwrap().push(coord);
        Ok(())
    }
}

// =============================================================================
// Propagation into a durable queue
// =============================================================================

#[test]
fn test_expired_file_propagates_through_disk_backends() {
    let workspace = Workspace::new("10/512/512\n10/513/512\n");
    let index = workspace.index();
    let queue = workspace.queue();

    let config = PropagateConfig::new(workspace.expired_file()).explode_until(8);
    let summary = propagate(&config, Some(&*index), &queue).unwrap();

    // Two siblings at zoom 10 share a parent at 9 and grandparent at 8.
    assert_eq!(summary.parsed, 2);
    assert_eq!(summary.exploded, 4);
    assert_eq!(summary.enqueued, 4);
    assert!(
        !workspace.expired_file().exists(),
        "expired file is consumed on success"
    );

    let jobs = queue.read(10, Duration::ZERO).unwrap();
    let coords: Vec<_> = jobs.iter().map(|job| job.coord).collect();
    assert!(coords.contains(&coord(10, 512, 512)));
    assert!(coords.contains(&coord(10, 513, 512)));
    assert!(coords.contains(&coord(9, 256, 256)));
    assert!(coords.contains(&coord(8, 128, 128)));
}

#[test]
fn test_index_survivors_skip_already_rendered_tiles() {
    let workspace = Workspace::new("10/512/512\n");
    let index = workspace.index();
    index
        .write(
            Box::new(vec![coord(9, 256, 256), coord(8, 128, 128)].into_iter()),
            &Progress::default(),
        )
        .unwrap();

    let queue = workspace.queue();
    let config = PropagateConfig::new(workspace.expired_file()).explode_until(8);
    let summary = propagate(&config, Some(&*index), &queue).unwrap();

    assert_eq!(summary.exploded, 3);
    assert_eq!(summary.enqueued, 1, "only the uncached leaf survives");
    let jobs = queue.read(10, Duration::ZERO).unwrap();
    assert_eq!(jobs[0].coord, coord(10, 512, 512));
}

#[test]
fn test_queue_contents_survive_process_restart() {
    let workspace = Workspace::new("10/512/512\n");
    {
        let queue = workspace.queue();
        let config = PropagateConfig::new(workspace.expired_file()).explode_until(9);
        propagate(&config, None, &queue).unwrap();
    }

    // A fresh handle over the same spool sees everything still pending.
    let reopened = workspace.queue();
    let jobs = reopened.read(10, Duration::ZERO).unwrap();
    assert_eq!(jobs.len(), 2);
}

// =============================================================================
// Worker pool drains the propagated queue
// =============================================================================

#[test]
fn test_workers_drain_propagated_queue() {
    let workspace = Workspace::new("10/512/512\n10/513/512\n");
    let queue = workspace.queue();
    let config = PropagateConfig::new(workspace.expired_file()).explode_until(8);
    propagate(&config, None, &queue).unwrap();

    let processor = Arc::new(Collector::default());
    let pool = WorkerPool::start(
        WorkerPoolConfig {
            workers: 2,
            messages_at_once: 2,
            read_timeout: Duration::from_millis(10),
            daemon: false,
        },
        Arc::new(queue),
        processor.clone(),
    );
    let summary = pool.join();

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(processor.coords.lock().unwrap().len(), 4);
}

#[test]
fn test_failed_job_redelivers_until_processed() {
    let workspace = Workspace::new("10/512/512\n");
    let queue =
        DurableQueue::open(workspace.root.path().join("spool"), Duration::from_millis(20))
            .unwrap();
    let config = PropagateConfig::new(workspace.expired_file()).explode_until(10);
    propagate(&config, None, &queue).unwrap();

    let processor = Arc::new(Collector::default());
    processor.failures_left.store(1, Ordering::SeqCst);

    let pool = WorkerPool::start(
        WorkerPoolConfig {
            workers: 1,
            messages_at_once: 1,
            read_timeout: Duration::from_millis(10),
            daemon: true,
        },
        Arc::new(queue),
        processor.clone(),
    );

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while processor.coords.lock().unwrap().is_empty() {
        assert!(
            std::time::Instant::now() < deadline,
            "job was not redelivered after the visibility window"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
    let summary = pool.shutdown();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(processor.coords.lock().unwrap()[0], coord(10, 512, 512));
}
