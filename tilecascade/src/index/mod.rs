//! Cache index of known-rendered tiles
//!
//! A cache index is a named, durable set of coordinate tokens recording
//! which tiles already exist in tile storage. The propagation pipeline
//! streams exploded coordinates through it to drop tiles that need no
//! re-render. Both the input stream and the backing set can exceed
//! process memory, so every operation is lazy and single-pass.

mod disk;
mod memory;
mod types;

pub use disk::DiskCacheIndex;
pub use memory::MemoryCacheIndex;
pub use types::{IndexError, Progress};

use crate::coord::{Coord, CoordToken};
use std::path::PathBuf;

/// Boxed lazy stream of coordinates fed into an index operation.
pub type CoordStream<'a> = Box<dyn Iterator<Item = Coord> + 'a>;

/// Boxed lazy stream of filtered coordinates out of an index operation.
///
/// An `Err` item means the backend failed mid-stream; the stream ends
/// there and the caller decides whether to restart from the beginning.
pub type FilteredStream<'a> = Box<dyn Iterator<Item = Result<Coord, IndexError>> + 'a>;

/// Which side of the membership test a filter keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Keep coordinates whose token is in the set (intersection)
    Cached,
    /// Keep coordinates whose token is not in the set (difference)
    NotCached,
}

/// Durable set of coordinate tokens keyed by a set name.
///
/// Writes are idempotent: re-writing a token that is already present
/// leaves membership unchanged. Filters process their input lazily and
/// report progress through the supplied [`Progress`].
pub trait CacheIndex: Send + Sync {
    /// The logical set key this index serves.
    fn set_key(&self) -> &str;

    /// Streams tokens into the set, returning the number of input
    /// coordinates processed.
    fn write(&self, coords: CoordStream<'_>, progress: &Progress) -> Result<u64, IndexError>;

    /// Streams `coords` through a membership test, keeping the side
    /// selected by `keep`.
    fn filter<'a>(
        &'a self,
        coords: CoordStream<'a>,
        keep: Membership,
        progress: Progress,
    ) -> FilteredStream<'a>;

    /// Keeps coordinates already present in the set.
    fn intersect<'a>(&'a self, coords: CoordStream<'a>, progress: Progress) -> FilteredStream<'a> {
        self.filter(coords, Membership::Cached, progress)
    }

    /// Keeps coordinates missing from the set — the propagation side of
    /// the dedup contract.
    fn difference<'a>(&'a self, coords: CoordStream<'a>, progress: Progress) -> FilteredStream<'a> {
        self.filter(coords, Membership::NotCached, progress)
    }
}

/// Closed set of cache-index backends selectable at startup.
#[derive(Debug, Clone)]
pub enum IndexKind {
    /// Process-local token set; tests and single-run tooling
    Memory,
    /// Sorted record file per set key under `directory`
    Disk {
        /// Directory holding one `<set_key>.idx` file per set
        directory: PathBuf,
    },
}

/// Constructs the cache-index backend for `kind`.
///
/// # Errors
///
/// Returns an `IndexError` if a disk backend cannot open its directory
/// or finds a misaligned record file.
pub fn make_cache_index(
    kind: &IndexKind,
    set_key: impl Into<String>,
) -> Result<Box<dyn CacheIndex>, IndexError> {
    match kind {
        IndexKind::Memory => Ok(Box::new(MemoryCacheIndex::new(set_key))),
        IndexKind::Disk { directory } => {
            Ok(Box::new(DiskCacheIndex::open(directory.clone(), set_key)?))
        }
    }
}

/// Shared filter implementation over a per-token membership probe.
///
/// Fuses after the first probe failure: a backend error mid-stream is
/// fatal to the invocation.
pub(crate) struct MemberFilter<'a> {
    input: CoordStream<'a>,
    probe: Box<dyn FnMut(&CoordToken) -> Result<bool, IndexError> + 'a>,
    keep: Membership,
    progress: Progress,
    processed: u64,
    failed: bool,
}

impl<'a> MemberFilter<'a> {
    pub(crate) fn new(
        input: CoordStream<'a>,
        probe: Box<dyn FnMut(&CoordToken) -> Result<bool, IndexError> + 'a>,
        keep: Membership,
        progress: Progress,
    ) -> Self {
        Self {
            input,
            probe,
            keep,
            progress,
            processed: 0,
            failed: false,
        }
    }
}

impl Iterator for MemberFilter<'_> {
    type Item = Result<Coord, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for coord in self.input.by_ref() {
            self.processed += 1;
            self.progress.tick(self.processed);

            let member = match (self.probe)(&coord.to_token()) {
                Ok(member) => member,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            };
            let keep = match self.keep {
                Membership::Cached => member,
                Membership::NotCached => !member,
            };
            if keep {
                return Some(Ok(coord));
            }
        }
        None
    }
}
