//! The expired-tile propagation run.
//!
//! Read an expired-tile list, explode each leaf into its ancestor
//! chain, optionally drop coordinates the cache index already contains
//! so only not-yet-cached tiles are enqueued, and hand the survivors to
//! the queue. Stages are chained as lazy iterators, so memory use is
//! bounded by stage buffering rather than the coordinate count.

use crate::coord::Coord;
use crate::index::{CacheIndex, IndexError, Progress};
use crate::pipeline::{ExpiredCoords, PipelineError, ReadStats};
use crate::pyramid::explode;
use crate::queue::TileQueue;
use std::cell::Cell;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{info, warn};

/// Enqueue progress is logged every this many coordinates.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 500_000;

/// Configuration for one propagation run.
#[derive(Debug, Clone)]
pub struct PropagateConfig {
    /// Newline-delimited expired-tile list
    pub expired_file: PathBuf,
    /// Coarsest zoom to explode to; `None` goes to the root
    pub explode_until: Option<u8>,
    /// Progress logging cadence during enqueue
    pub progress_interval: u64,
    /// Delete the expired file once the queue confirmed the batch
    pub remove_on_success: bool,
}

impl PropagateConfig {
    /// Creates a run configuration with default cadence and cleanup.
    pub fn new(expired_file: impl Into<PathBuf>) -> Self {
        Self {
            expired_file: expired_file.into(),
            explode_until: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            remove_on_success: true,
        }
    }

    /// Sets the coarsest zoom the explosion reaches.
    pub fn explode_until(mut self, zoom: u8) -> Self {
        self.explode_until = Some(zoom);
        self
    }
}

/// Stages of a propagation run, for logs and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Reading,
    Exploding,
    Intersecting,
    Enqueueing,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Reading => "reading",
            RunPhase::Exploding => "exploding",
            RunPhase::Intersecting => "intersecting",
            RunPhase::Enqueueing => "enqueueing",
            RunPhase::Draining => "draining",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters from a completed propagation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Expired lines parsed into coordinates
    pub parsed: u64,
    /// Malformed expired lines skipped
    pub skipped: u64,
    /// Leaves rejected by the explosion contract (target above leaf)
    pub rejected: u64,
    /// Coordinates produced by the explosion
    pub exploded: u64,
    /// Coordinates accepted by the queue
    pub enqueued: u64,
}

/// Runs one propagation pass from an expired file into a queue.
///
/// With an `index`, only coordinates the cache index does NOT contain
/// are enqueued — a tile already known-rendered at some zoom is never
/// re-queued. Without one, every exploded coordinate is enqueued.
///
/// The expired file is deleted only after the queue has confirmed the
/// whole batch; any failure leaves it intact so a restart re-derives
/// everything from the same input.
///
/// # Errors
///
/// Returns a `PipelineError` for whole-operation failures: unreadable
/// expired file, index backend failure mid-stream, or queue rejection.
pub fn propagate(
    config: &PropagateConfig,
    index: Option<&dyn CacheIndex>,
    queue: &dyn TileQueue,
) -> Result<RunSummary, PipelineError> {
    info!(
        file = %config.expired_file.display(),
        explode_until = config.explode_until.unwrap_or(0),
        dedup = index.is_some(),
        phase = %RunPhase::Reading,
        "starting propagation run"
    );

    let file = File::open(&config.expired_file)?;
    let stats = ReadStats::default();
    let expired = ExpiredCoords::new(BufReader::new(file), stats.clone());

    let rejected = Cell::new(0u64);
    let exploded_count = Cell::new(0u64);
    let exploded = explode(expired, config.explode_until).filter_map(|item| match item {
        Ok(coord) => {
            exploded_count.set(exploded_count.get() + 1);
            Some(coord)
        }
        Err(err) => {
            warn!(error = %err, phase = %RunPhase::Exploding, "leaf rejected; skipping");
            rejected.set(rejected.get() + 1);
            None
        }
    });

    // An index failure inside the stream has nowhere to surface until the
    // queue hands control back, so park it here and end the stream.
    let index_failure: Cell<Option<IndexError>> = Cell::new(None);
    let survivors: Box<dyn Iterator<Item = Coord> + '_> = match index {
        Some(index) => Box::new(
            index
                .difference(
                    Box::new(exploded),
                    Progress::every(config.progress_interval),
                )
                .map_while(|item| match item {
                    Ok(coord) => Some(coord),
                    Err(err) => {
                        index_failure.set(Some(err));
                        None
                    }
                }),
        ),
        None => Box::new(exploded),
    };

    let interval = config.progress_interval.max(1);
    let enqueue_count = Cell::new(0u64);
    let mut to_enqueue = survivors.inspect(|_| {
        let n = enqueue_count.get() + 1;
        enqueue_count.set(n);
        if n % interval == 0 {
            info!(processed = n, phase = %RunPhase::Enqueueing, "enqueue progress");
        }
    });

    let enqueued = queue.enqueue_batch(&mut to_enqueue)?;

    if let Some(err) = index_failure.take() {
        warn!(error = %err, phase = %RunPhase::Failed, "cache index failed mid-stream");
        return Err(err.into());
    }

    if config.remove_on_success {
        fs::remove_file(&config.expired_file)?;
        info!(
            file = %config.expired_file.display(),
            phase = %RunPhase::Draining,
            "removed expired file after confirmed enqueue"
        );
    }

    let summary = RunSummary {
        parsed: stats.parsed(),
        skipped: stats.skipped(),
        rejected: rejected.get(),
        exploded: exploded_count.get(),
        enqueued,
    };
    info!(
        parsed = summary.parsed,
        skipped = summary.skipped,
        rejected = summary.rejected,
        exploded = summary.exploded,
        enqueued = summary.enqueued,
        phase = %RunPhase::Done,
        "propagation run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryCacheIndex;
    use crate::queue::{JobHandle, MemoryQueue, QueueError, QueueJob};
    use std::time::Duration;
    use tempfile::tempdir;

    fn coord(zoom: u8, column: u64, row: u64) -> Coord {
        Coord::new(zoom, column, row).unwrap()
    }

    fn write_expired(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("expired.txt");
        fs::write(&path, contents).unwrap();
        path
    }

    fn drain(queue: &MemoryQueue) -> Vec<Coord> {
        queue
            .read(usize::MAX, Duration::ZERO)
            .unwrap()
            .into_iter()
            .map(|job| job.coord)
            .collect()
    }

    #[test]
    fn test_end_to_end_with_empty_index() {
        let dir = tempdir().unwrap();
        let path = write_expired(dir.path(), "10/512/512\n");
        let config = PropagateConfig::new(&path).explode_until(8);

        let index = MemoryCacheIndex::new("cache");
        let queue = MemoryQueue::new();
        let summary = propagate(&config, Some(&index), &queue).unwrap();

        assert_eq!(summary.parsed, 1);
        assert_eq!(summary.exploded, 3);
        assert_eq!(summary.enqueued, 3);
        assert_eq!(
            drain(&queue),
            vec![coord(10, 512, 512), coord(9, 256, 256), coord(8, 128, 128)]
        );
        assert!(!path.exists(), "expired file removed after success");
    }

    #[test]
    fn test_cached_tiles_not_requeued() {
        let dir = tempdir().unwrap();
        let path = write_expired(dir.path(), "10/512/512\n");
        let config = PropagateConfig::new(&path).explode_until(8);

        let index = MemoryCacheIndex::new("cache");
        index
            .write(
                Box::new(std::iter::once(coord(8, 128, 128))),
                &Progress::default(),
            )
            .unwrap();
        let queue = MemoryQueue::new();
        let summary = propagate(&config, Some(&index), &queue).unwrap();

        assert_eq!(summary.exploded, 3);
        assert_eq!(summary.enqueued, 2, "known-rendered ancestor is dropped");
        assert_eq!(drain(&queue), vec![coord(10, 512, 512), coord(9, 256, 256)]);
    }

    #[test]
    fn test_without_index_everything_enqueues() {
        let dir = tempdir().unwrap();
        let path = write_expired(dir.path(), "5/10/7\n5/11/7\n");
        let config = PropagateConfig::new(&path).explode_until(3);

        let queue = MemoryQueue::new();
        let summary = propagate(&config, None, &queue).unwrap();

        // Shared ancestors still deduplicate inside the explosion
        assert_eq!(summary.enqueued, 4);
    }

    #[test]
    fn test_malformed_lines_are_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let path = write_expired(dir.path(), "10/512/512\nnot-a-tile\n\n");
        let config = PropagateConfig::new(&path).explode_until(10);

        let queue = MemoryQueue::new();
        let summary = propagate(&config, None, &queue).unwrap();
        assert_eq!(summary.parsed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.enqueued, 1);
    }

    #[test]
    fn test_leaf_below_target_rejected_and_counted() {
        let dir = tempdir().unwrap();
        let path = write_expired(dir.path(), "4/1/1\n10/512/512\n");
        let config = PropagateConfig::new(&path).explode_until(8);

        let queue = MemoryQueue::new();
        let summary = propagate(&config, None, &queue).unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.enqueued, 3, "the valid leaf still propagates");
    }

    #[test]
    fn test_missing_expired_file_is_an_error() {
        let config = PropagateConfig::new("/nonexistent/expired.txt");
        let queue = MemoryQueue::new();
        assert!(matches!(
            propagate(&config, None, &queue),
            Err(PipelineError::Io(_))
        ));
    }

    /// Queue whose backing resource is unreachable.
    struct DeadQueue;

    impl TileQueue for DeadQueue {
        fn enqueue(&self, _coord: Coord) -> Result<(), QueueError> {
            Err(QueueError::Unavailable(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "backend down",
            )))
        }
        fn enqueue_batch(
            &self,
            _coords: &mut dyn Iterator<Item = Coord>,
        ) -> Result<u64, QueueError> {
            self.enqueue(coord_for_stub()).map(|_| 0)
        }
        fn read(&self, _max: usize, _t: Duration) -> Result<Vec<QueueJob>, QueueError> {
            Ok(Vec::new())
        }
        fn ack(&self, _handle: JobHandle) -> Result<(), QueueError> {
            Ok(())
        }
        fn clear(&self) -> Result<u64, QueueError> {
            Ok(0)
        }
    }

    fn coord_for_stub() -> Coord {
        Coord::new(0, 0, 0).unwrap()
    }

    #[test]
    fn test_failed_run_keeps_expired_file() {
        let dir = tempdir().unwrap();
        let path = write_expired(dir.path(), "10/512/512\n");
        let config = PropagateConfig::new(&path).explode_until(8);

        let result = propagate(&config, None, &DeadQueue);
        assert!(matches!(result, Err(PipelineError::Queue(_))));
        assert!(path.exists(), "expired file must survive a failed run");
    }
}
