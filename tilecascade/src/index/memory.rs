//! In-memory cache index.

use super::{CacheIndex, CoordStream, FilteredStream, IndexError, MemberFilter, Membership};
use crate::coord::CoordToken;
use crate::index::Progress;
use dashmap::DashMap;

/// Process-local cache index backed by a concurrent token set.
///
/// Holds the whole set in memory, so it suits tests and single-run
/// tooling rather than the multi-million-entry production sets the disk
/// backend exists for. Probes never fail.
pub struct MemoryCacheIndex {
    set_key: String,
    tokens: DashMap<CoordToken, ()>,
}

impl MemoryCacheIndex {
    /// Creates an empty index for the given set key.
    pub fn new(set_key: impl Into<String>) -> Self {
        Self {
            set_key: set_key.into(),
            tokens: DashMap::new(),
        }
    }

    /// Number of tokens currently in the set.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the set holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CacheIndex for MemoryCacheIndex {
    fn set_key(&self) -> &str {
        &self.set_key
    }

    fn write(&self, coords: CoordStream<'_>, progress: &Progress) -> Result<u64, IndexError> {
        let mut processed = 0u64;
        for coord in coords {
            self.tokens.insert(coord.to_token(), ());
            processed += 1;
            progress.tick(processed);
        }
        Ok(processed)
    }

    fn filter<'a>(
        &'a self,
        coords: CoordStream<'a>,
        keep: Membership,
        progress: Progress,
    ) -> FilteredStream<'a> {
        let probe = Box::new(move |token: &CoordToken| Ok(self.tokens.contains_key(token)));
        Box::new(MemberFilter::new(coords, probe, keep, progress))
    }
}
