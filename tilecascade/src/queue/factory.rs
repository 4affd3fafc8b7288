//! Queue factory for startup-time backend selection.

use super::{DurableQueue, MemoryQueue, QueueError, SinkQueue, TileQueue};
use std::path::PathBuf;
use std::time::Duration;

/// Closed set of queue backends selectable at startup.
///
/// Construction goes through [`make_queue`] so callers hold a single
/// trait object regardless of the backend behind it.
#[derive(Debug, Clone)]
pub enum QueueKind {
    /// Spool-directory queue with visibility-timeout redelivery
    Durable {
        /// Spool directory, created on open
        directory: PathBuf,
        /// Visibility window for delivered messages
        visibility: Duration,
    },

    /// In-process FIFO; exactly-once within the process lifetime
    Memory,

    /// Write-only dump to a file; read-side operations unsupported
    File {
        /// Output file, truncated on open
        path: PathBuf,
    },

    /// Write-only dump to standard output
    Stdout,
}

/// Constructs the queue backend for `kind`.
///
/// # Errors
///
/// Returns a `QueueError` if the backing resource (spool directory,
/// output file) cannot be opened.
pub fn make_queue(kind: &QueueKind) -> Result<Box<dyn TileQueue>, QueueError> {
    match kind {
        QueueKind::Durable {
            directory,
            visibility,
        } => Ok(Box::new(DurableQueue::open(directory.clone(), *visibility)?)),
        QueueKind::Memory => Ok(Box::new(MemoryQueue::new())),
        QueueKind::File { path } => Ok(Box::new(SinkQueue::to_file(path)?)),
        QueueKind::Stdout => Ok(Box::new(SinkQueue::to_stdout())),
    }
}
