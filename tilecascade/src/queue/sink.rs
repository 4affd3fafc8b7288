//! Write-only sink queues.
//!
//! Dumps coordinates as `zoom/column/row` lines to a file or stdout
//! instead of a live queue. Useful for inspecting what a run would
//! enqueue; read-side operations are unsupported by design.

use super::{JobHandle, QueueError, QueueJob, TileQueue};
use crate::coord::Coord;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Append-only queue writing one coordinate per line.
pub struct SinkQueue<W: Write + Send> {
    writer: Mutex<W>,
}

impl SinkQueue<BufWriter<File>> {
    /// Creates a sink writing to a file, truncating any existing content.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Unavailable` if the file cannot be created.
    pub fn to_file(path: &Path) -> Result<Self, QueueError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl SinkQueue<io::Stdout> {
    /// Creates a sink writing to standard output.
    pub fn to_stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> SinkQueue<W> {
    /// Wraps an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> TileQueue for SinkQueue<W> {
    fn enqueue(&self, coord: Coord) -> Result<(), QueueError> {
        let mut writer = self.writer.lock().unwrap();
        writeln!(writer, "{coord}")?;
        Ok(())
    }

    fn enqueue_batch(&self, coords: &mut dyn Iterator<Item = Coord>) -> Result<u64, QueueError> {
        let mut writer = self.writer.lock().unwrap();
        let mut count = 0u64;
        for coord in coords {
            writeln!(writer, "{coord}")?;
            count += 1;
        }
        writer.flush()?;
        Ok(count)
    }

    fn read(&self, _max_to_read: usize, _timeout: Duration) -> Result<Vec<QueueJob>, QueueError> {
        Err(QueueError::Unsupported("read on a write-only sink"))
    }

    fn ack(&self, _handle: JobHandle) -> Result<(), QueueError> {
        Err(QueueError::Unsupported("ack on a write-only sink"))
    }

    fn clear(&self) -> Result<u64, QueueError> {
        Err(QueueError::Unsupported("clear on a write-only sink"))
    }
}
