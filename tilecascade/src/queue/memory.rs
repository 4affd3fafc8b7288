//! In-memory FIFO queue for tests and single-process runs.

use super::{JobHandle, QueueError, QueueJob, TileQueue};
use crate::coord::Coord;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Single-process FIFO queue with immediate, exactly-once delivery.
///
/// `read` removes jobs permanently, so `ack` has nothing left to do;
/// there is no redelivery. Blocking reads park on a condvar until a
/// message arrives or the timeout lapses.
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Coord>>,
    available: Condvar,
    next_handle: Mutex<u64>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            next_handle: Mutex::new(0),
        }
    }

    /// Number of jobs currently waiting.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Whether no jobs are waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }

    fn mint_handle(&self) -> JobHandle {
        let mut next = self.next_handle.lock().unwrap();
        let handle = JobHandle(*next);
        *next += 1;
        handle
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TileQueue for MemoryQueue {
    fn enqueue(&self, coord: Coord) -> Result<(), QueueError> {
        self.pending.lock().unwrap().push_back(coord);
        self.available.notify_one();
        Ok(())
    }

    fn enqueue_batch(&self, coords: &mut dyn Iterator<Item = Coord>) -> Result<u64, QueueError> {
        let mut count = 0u64;
        {
            let mut pending = self.pending.lock().unwrap();
            for coord in coords {
                pending.push_back(coord);
                count += 1;
            }
        }
        self.available.notify_all();
        Ok(count)
    }

    fn read(&self, max_to_read: usize, timeout: Duration) -> Result<Vec<QueueJob>, QueueError> {
        if max_to_read == 0 {
            return Err(QueueError::ContractViolation(
                "read requires max_to_read > 0".to_string(),
            ));
        }

        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock().unwrap();
        while pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let (guard, wait) = self
                .available
                .wait_timeout(pending, deadline - now)
                .unwrap();
            pending = guard;
            if wait.timed_out() && pending.is_empty() {
                return Ok(Vec::new());
            }
        }

        let take = max_to_read.min(pending.len());
        let mut jobs = Vec::with_capacity(take);
        for _ in 0..take {
            let coord = pending.pop_front().expect("len checked above");
            jobs.push(QueueJob {
                coord,
                handle: self.mint_handle(),
            });
        }
        Ok(jobs)
    }

    fn ack(&self, _handle: JobHandle) -> Result<(), QueueError> {
        // Delivery already removed the job; acking again is harmless
        Ok(())
    }

    fn clear(&self) -> Result<u64, QueueError> {
        let mut pending = self.pending.lock().unwrap();
        let count = pending.len() as u64;
        pending.clear();
        Ok(count)
    }
}
