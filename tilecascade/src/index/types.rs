//! Cache-index error and progress types.

use crate::coord::DecodeError;
use std::io;

/// Errors raised by cache-index backends.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Backend storage failed; fatal to the invocation, never retried here
    #[error("index backend unavailable: {0}")]
    Io(#[from] io::Error),

    /// A stored record failed to decode; indicates storage corruption
    #[error("corrupt index record: {0}")]
    Corrupt(#[from] DecodeError),

    /// The record file length is not a whole number of records
    #[error("index file size {0} is not a multiple of the record width")]
    Misaligned(u64),
}

/// Progress side-channel for long streaming operations.
///
/// Streaming writes and membership filters can run over millions of
/// entries; the owner of a `Progress` hears about every `interval`
/// processed items through its callback, or through a debug log line when
/// no callback is installed. Progress is observability only and never
/// affects results.
pub struct Progress {
    interval: u64,
    callback: Option<Box<dyn Fn(u64) + Send>>,
}

impl Progress {
    /// Default reporting interval, matching the propagation pipeline's
    /// enqueue logging cadence.
    pub const DEFAULT_INTERVAL: u64 = 500_000;

    /// Creates a progress reporter with the given interval.
    pub fn every(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            callback: None,
        }
    }

    /// Installs a callback invoked with the running item count.
    pub fn with_callback(mut self, callback: impl Fn(u64) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Records one processed item, reporting when the interval is hit.
    pub fn tick(&self, processed: u64) {
        if processed % self.interval != 0 {
            return;
        }
        match &self.callback {
            Some(callback) => callback(processed),
            None => tracing::debug!(processed, "index stream progress"),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::every(Self::DEFAULT_INTERVAL)
    }
}
