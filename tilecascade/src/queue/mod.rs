//! Work queue abstraction
//!
//! Queues carry coordinate jobs from the propagation pipeline to the
//! render workers. Backends are interchangeable behind [`TileQueue`]:
//! a spool-directory queue with at-least-once delivery and visibility
//! timeouts, an in-memory queue for tests, and write-only sinks that
//! dump coordinates to a file or stdout instead of a live queue.

mod durable;
mod factory;
mod memory;
mod sink;

pub use durable::{DurableQueue, DEFAULT_VISIBILITY, WIRE_BATCH_LIMIT};
pub use factory::{make_queue, QueueKind};
pub use memory::MemoryQueue;
pub use sink::SinkQueue;

use crate::coord::{Coord, DecodeError};
use std::time::Duration;

/// Opaque receipt for a delivered job.
///
/// Backends mint handles on `read`; the only valid use is passing one
/// back to [`TileQueue::ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(pub(crate) u64);

/// A delivered unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueJob {
    /// The tile to re-render
    pub coord: Coord,
    /// Receipt to acknowledge once the work is done
    pub handle: JobHandle,
}

/// Errors raised by queue backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Backing resource is unreachable; retry policy belongs to the caller
    #[error("queue backend unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The backend does not implement this operation (write-only sinks)
    #[error("operation not supported by this queue: {0}")]
    Unsupported(&'static str),

    /// Caller broke the queue contract; configuration or programmer error
    #[error("queue contract violation: {0}")]
    ContractViolation(String),

    /// A stored payload failed to decode; indicates spool corruption
    #[error("corrupt queue payload: {0}")]
    Corrupt(#[from] DecodeError),
}

/// Capability set shared by every queue backend.
pub trait TileQueue: Send + Sync {
    /// Enqueues a single coordinate job.
    fn enqueue(&self, coord: Coord) -> Result<(), QueueError>;

    /// Enqueues a whole stream, returning the number accepted.
    ///
    /// Backends with a per-call wire limit chunk internally and
    /// aggregate the count.
    fn enqueue_batch(&self, coords: &mut dyn Iterator<Item = Coord>) -> Result<u64, QueueError>;

    /// Reads up to `max_to_read` jobs, blocking up to `timeout` while the
    /// queue is empty. Returns an empty vec when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// `max_to_read == 0` is a `ContractViolation`.
    fn read(&self, max_to_read: usize, timeout: Duration) -> Result<Vec<QueueJob>, QueueError>;

    /// Acknowledges a delivered job as complete. Idempotent: acking an
    /// unknown or already-acked handle succeeds.
    fn ack(&self, handle: JobHandle) -> Result<(), QueueError>;

    /// Removes every queued message, returning the count removed.
    fn clear(&self) -> Result<u64, QueueError>;
}
