//! Durable spool-directory queue with at-least-once delivery.
//!
//! Every message is one token file in the spool directory. `read` marks
//! delivered messages in-flight with a visibility deadline instead of
//! removing them; only `ack` deletes the file. A message whose deadline
//! lapses without an ack becomes deliverable again, and a process
//! restart finds every surviving file pending — both give at-least-once
//! delivery, the sole coordination mechanism the render workers rely on.

use super::{JobHandle, QueueError, QueueJob, TileQueue};
use crate::coord::{Coord, CoordToken};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-call message limit on the enqueue wire.
pub const WIRE_BATCH_LIMIT: usize = 10;

/// Default visibility window for delivered messages.
pub const DEFAULT_VISIBILITY: Duration = Duration::from_secs(30);

/// File extension for spooled messages.
const MESSAGE_EXT: &str = "msg";

/// Poll interval while a blocking read waits for messages.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A delivered message awaiting acknowledgment.
struct InFlight {
    path: PathBuf,
    deadline: Instant,
}

/// Spool-directory queue.
pub struct DurableQueue {
    directory: PathBuf,
    visibility: Duration,
    /// Delivered-but-unacked messages keyed by handle
    in_flight: DashMap<u64, InFlight>,
    /// Serializes scan-and-claim; without it two readers can snapshot
    /// the spool before either registers its claims and deliver the
    /// same message inside the visibility window
    claim_lock: Mutex<()>,
    /// Monotonic source of message sequence numbers and handles
    seq: AtomicU64,
    /// Number of enqueue wire calls issued (chunking observability)
    wire_calls: AtomicU64,
}

impl DurableQueue {
    /// Opens the queue rooted at `directory`, creating it if needed.
    ///
    /// Messages left behind by a previous process are pending again.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Unavailable` if the spool directory cannot
    /// be created or scanned.
    pub fn open(directory: impl Into<PathBuf>, visibility: Duration) -> Result<Self, QueueError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        // Resume the sequence above any message left in the spool
        let mut max_seq = 0u64;
        let mut recovered = 0u64;
        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            if let Some(seq) = message_seq(&path) {
                max_seq = max_seq.max(seq + 1);
                recovered += 1;
            }
        }
        if recovered > 0 {
            debug!(recovered, "recovered pending messages from spool");
        }

        Ok(Self {
            directory,
            visibility,
            in_flight: DashMap::new(),
            claim_lock: Mutex::new(()),
            seq: AtomicU64::new(max_seq),
            wire_calls: AtomicU64::new(0),
        })
    }

    /// Number of enqueue wire calls issued so far.
    pub fn wire_calls(&self) -> u64 {
        self.wire_calls.load(Ordering::Relaxed)
    }

    fn message_path(&self, seq: u64) -> PathBuf {
        self.directory.join(format!("{seq:020}.{MESSAGE_EXT}"))
    }

    /// Writes one wire call's worth of messages (at most
    /// [`WIRE_BATCH_LIMIT`]) into the spool.
    fn send_chunk(&self, chunk: &[Coord]) -> Result<(), QueueError> {
        debug_assert!(chunk.len() <= WIRE_BATCH_LIMIT);
        for coord in chunk {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            fs::write(self.message_path(seq), coord.to_token().as_bytes())?;
        }
        self.wire_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Releases expired in-flight messages back to pending.
    fn release_expired(&self) {
        let now = Instant::now();
        self.in_flight.retain(|_, entry| {
            if entry.deadline <= now {
                warn!(path = %entry.path.display(), "visibility window lapsed; redelivering");
                false
            } else {
                true
            }
        });
    }

    /// Scans the spool for deliverable messages, oldest first.
    ///
    /// Holds the claim lock from directory snapshot through in-flight
    /// registration so the filter below always sees claims made by a
    /// concurrent reader.
    fn scan_pending(&self, max_to_read: usize) -> Result<Vec<QueueJob>, QueueError> {
        let _claim = self.claim_lock.lock().unwrap();
        self.release_expired();

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| message_seq(path).is_some())
            .filter(|path| !self.is_in_flight(path))
            .collect();
        paths.sort();

        let mut jobs = Vec::new();
        for path in paths.into_iter().take(max_to_read) {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // Raced with a concurrent ack; skip
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let coord = CoordToken::decode(&bytes)?;

            let handle = JobHandle(self.seq.fetch_add(1, Ordering::SeqCst));
            self.in_flight.insert(
                handle.0,
                InFlight {
                    path,
                    deadline: Instant::now() + self.visibility,
                },
            );
            jobs.push(QueueJob { coord, handle });
        }
        Ok(jobs)
    }

    fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight.iter().any(|entry| entry.path == path)
    }
}

impl TileQueue for DurableQueue {
    fn enqueue(&self, coord: Coord) -> Result<(), QueueError> {
        self.send_chunk(std::slice::from_ref(&coord))
    }

    fn enqueue_batch(&self, coords: &mut dyn Iterator<Item = Coord>) -> Result<u64, QueueError> {
        let mut count = 0u64;
        let mut chunk = Vec::with_capacity(WIRE_BATCH_LIMIT);
        for coord in coords {
            chunk.push(coord);
            if chunk.len() == WIRE_BATCH_LIMIT {
                self.send_chunk(&chunk)?;
                count += chunk.len() as u64;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            self.send_chunk(&chunk)?;
            count += chunk.len() as u64;
        }
        Ok(count)
    }

    fn read(&self, max_to_read: usize, timeout: Duration) -> Result<Vec<QueueJob>, QueueError> {
        if max_to_read == 0 {
            return Err(QueueError::ContractViolation(
                "read requires max_to_read > 0".to_string(),
            ));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let jobs = self.scan_pending(max_to_read)?;
            if !jobs.is_empty() {
                return Ok(jobs);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            thread::sleep(READ_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn ack(&self, handle: JobHandle) -> Result<(), QueueError> {
        // Unknown handles are already acked or expired; both are fine
        if let Some((_, entry)) = self.in_flight.remove(&handle.0) {
            match fs::remove_file(&entry.path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<u64, QueueError> {
        self.in_flight.clear();
        let mut removed = 0u64;
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if message_seq(&path).is_some() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Parses the sequence number out of a spool file name, or `None` for
/// files that are not messages (temp files, strays).
fn message_seq(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != MESSAGE_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn coord(zoom: u8, column: u64, row: u64) -> Coord {
        Coord::new(zoom, column, row).unwrap()
    }

    fn open(dir: &std::path::Path, visibility: Duration) -> DurableQueue {
        DurableQueue::open(dir.to_path_buf(), visibility).unwrap()
    }

    #[test]
    fn test_enqueue_read_ack_cycle() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);

        queue.enqueue(coord(5, 10, 7)).unwrap();
        let jobs = queue.read(10, Duration::ZERO).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].coord, coord(5, 10, 7));

        queue.ack(jobs[0].handle).unwrap();
        assert!(queue.read(10, Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_in_flight_message_is_invisible() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);

        queue.enqueue(coord(5, 10, 7)).unwrap();
        let first = queue.read(10, Duration::ZERO).unwrap();
        assert_eq!(first.len(), 1);

        // Not acked, but still inside the visibility window
        let second = queue.read(10, Duration::ZERO).unwrap();
        assert!(second.is_empty(), "in-flight job must be hidden");
    }

    #[test]
    fn test_unacked_message_redelivers_after_visibility_window() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), Duration::from_millis(30));

        queue.enqueue(coord(5, 10, 7)).unwrap();
        let first = queue.read(10, Duration::ZERO).unwrap();
        assert_eq!(first.len(), 1);

        thread::sleep(Duration::from_millis(50));
        let second = queue.read(10, Duration::ZERO).unwrap();
        assert_eq!(second.len(), 1, "expired job must redeliver");
        assert_eq!(second[0].coord, coord(5, 10, 7));
        assert_ne!(second[0].handle, first[0].handle);
    }

    #[test]
    fn test_enqueue_batch_chunks_to_wire_limit() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);

        let mut coords = (0..25u64).map(|c| coord(10, c, c));
        let count = queue.enqueue_batch(&mut coords).unwrap();

        assert_eq!(count, 25, "aggregated count must cover every message");
        assert_eq!(queue.wire_calls(), 3, "25 messages need 3 wire calls of <= 10");
    }

    #[test]
    fn test_messages_survive_reopen_as_pending() {
        let dir = tempdir().unwrap();
        {
            let queue = open(dir.path(), DEFAULT_VISIBILITY);
            queue.enqueue(coord(8, 128, 128)).unwrap();
            // Deliver without acking; the process "crashes" here
            let jobs = queue.read(10, Duration::ZERO).unwrap();
            assert_eq!(jobs.len(), 1);
        }
        let reopened = open(dir.path(), DEFAULT_VISIBILITY);
        let jobs = reopened.read(10, Duration::ZERO).unwrap();
        assert_eq!(jobs.len(), 1, "unacked message must survive a restart");
        assert_eq!(jobs[0].coord, coord(8, 128, 128));
    }

    #[test]
    fn test_read_zero_is_contract_violation() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);
        assert!(matches!(
            queue.read(0, Duration::ZERO),
            Err(QueueError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_corrupt_payload_is_fatal() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);
        fs::write(dir.path().join(format!("{:020}.msg", 0)), [1u8, 2, 3]).unwrap();

        assert!(matches!(
            queue.read(10, Duration::ZERO),
            Err(QueueError::Corrupt(_))
        ));
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);
        let mut coords = (0..7u64).map(|c| coord(10, c, 0));
        queue.enqueue_batch(&mut coords).unwrap();

        assert_eq!(queue.clear().unwrap(), 7);
        assert!(queue.read(10, Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_readers_never_share_a_message() {
        use std::collections::HashSet;
        use std::sync::{Arc, Barrier};

        let dir = tempdir().unwrap();
        let queue = Arc::new(open(dir.path(), DEFAULT_VISIBILITY));
        let mut coords = (0..40u64).map(|c| coord(12, c, c));
        queue.enqueue_batch(&mut coords).unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    queue.read(40, Duration::ZERO).unwrap()
                })
            })
            .collect();

        let mut delivered = Vec::new();
        for reader in readers {
            delivered.extend(reader.join().unwrap());
        }

        let unique: HashSet<Coord> = delivered.iter().map(|job| job.coord).collect();
        assert_eq!(delivered.len(), 40, "every pending message must deliver");
        assert_eq!(
            unique.len(),
            delivered.len(),
            "no message may reach two readers inside the visibility window"
        );
    }

    #[test]
    fn test_fifo_by_sequence() {
        let dir = tempdir().unwrap();
        let queue = open(dir.path(), DEFAULT_VISIBILITY);
        queue.enqueue(coord(3, 0, 0)).unwrap();
        queue.enqueue(coord(3, 1, 1)).unwrap();

        let jobs = queue.read(10, Duration::ZERO).unwrap();
        assert_eq!(jobs[0].coord, coord(3, 0, 0));
        assert_eq!(jobs[1].coord, coord(3, 1, 1));
    }
}
