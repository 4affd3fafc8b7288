//! Expired-tile list reader.
//!
//! The expired list is newline-delimited text, one `zoom/column/row` per
//! line. Blank lines are ignored; malformed lines are logged and skipped
//! so one bad line never aborts a batch run.

use crate::coord::Coord;
use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Shared counters for an expired-list read.
///
/// Cloning shares the underlying counters, so the caller can keep a
/// handle while the reader is consumed by the stream.
#[derive(Debug, Clone, Default)]
pub struct ReadStats {
    parsed: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl ReadStats {
    /// Lines successfully parsed into coordinates.
    pub fn parsed(&self) -> u64 {
        self.parsed.load(Ordering::Relaxed)
    }

    /// Lines skipped as malformed (blank lines are not counted).
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_parsed(&self) {
        self.parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Lazy coordinate stream over an expired-tile list.
pub struct ExpiredCoords<R> {
    lines: std::io::Lines<R>,
    stats: ReadStats,
}

impl<R: BufRead> ExpiredCoords<R> {
    /// Wraps a buffered reader of expired-list text.
    pub fn new(reader: R, stats: ReadStats) -> Self {
        Self {
            lines: reader.lines(),
            stats,
        }
    }
}

impl<R: BufRead> Iterator for ExpiredCoords<R> {
    type Item = Coord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    // Undecodable bytes; skip the line like any other bad input
                    warn!(error = %err, "unreadable expired line; skipping");
                    self.stats.record_skipped();
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.parse::<Coord>() {
                Ok(coord) => {
                    self.stats.record_parsed();
                    return Some(coord);
                }
                Err(err) => {
                    warn!(line = trimmed, error = %err, "malformed expired line; skipping");
                    self.stats.record_skipped();
                }
            }
        }
    }
}
