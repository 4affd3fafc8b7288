//! Parent explosion of expired leaf tiles.
//!
//! A leaf expired at zoom z invalidates every coarser tile that contains
//! it, so each leaf expands into itself plus its ancestor chain up to a
//! target zoom. Expired leaves from one edit region share most of that
//! chain; the iterator keeps a per-zoom-level accumulator of already
//! emitted tokens and stops walking a chain at the first ancestor it has
//! seen before, since everything above it was emitted then. Memory is
//! bounded by the accumulator, never by the input stream.

use crate::coord::{Coord, CoordToken};
use std::collections::{HashMap, HashSet, VecDeque};

/// Errors reported per leaf during explosion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PyramidError {
    /// Target zoom is finer than the leaf itself
    #[error("target zoom {target} is below leaf {leaf}")]
    TargetBelowLeaf { leaf: Coord, target: u8 },
}

/// Explodes a stream of leaf coordinates into their ancestor chains.
///
/// For each leaf, yields the leaf and every ancestor at zooms
/// `target..leaf.zoom`, skipping any tile already emitted for an earlier
/// leaf. A `target` of `None` explodes all the way to the root. A leaf
/// whose zoom is below `target` yields an error item and the stream
/// continues with the next leaf.
///
/// # Example
///
/// ```
/// use tilecascade::coord::Coord;
/// use tilecascade::pyramid::explode;
///
/// let leaves = vec![Coord::new(5, 10, 7).unwrap()];
/// let tiles: Vec<_> = explode(leaves.into_iter(), Some(3))
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(tiles.len(), 3); // (5,10,7), (4,5,3), (3,2,1)
/// ```
pub fn explode<I>(leaves: I, target: Option<u8>) -> Explode<I::IntoIter>
where
    I: IntoIterator<Item = Coord>,
{
    Explode {
        leaves: leaves.into_iter(),
        target: target.unwrap_or(0),
        seen: HashMap::new(),
        pending: VecDeque::new(),
    }
}

/// Lazy iterator produced by [`explode`].
///
/// Holds no resumable checkpoint; restarting means re-invoking with the
/// same input sequence.
pub struct Explode<I> {
    leaves: I,
    target: u8,
    /// Already-emitted tokens, keyed by zoom level
    seen: HashMap<u8, HashSet<CoordToken>>,
    /// Chain of the current leaf, at most one entry per zoom level
    pending: VecDeque<Coord>,
}

impl<I> Explode<I>
where
    I: Iterator<Item = Coord>,
{
    /// Expands one leaf into `pending`, stopping at the first ancestor
    /// that was already emitted for an earlier leaf.
    fn expand(&mut self, leaf: Coord) -> Result<(), PyramidError> {
        if self.target > leaf.zoom {
            return Err(PyramidError::TargetBelowLeaf {
                leaf,
                target: self.target,
            });
        }

        let mut current = leaf;
        loop {
            let fresh = self
                .seen
                .entry(current.zoom)
                .or_default()
                .insert(current.to_token());
            if !fresh {
                break;
            }
            self.pending.push_back(current);
            if current.zoom == self.target {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(())
    }
}

impl<I> Iterator for Explode<I>
where
    I: Iterator<Item = Coord>,
{
    type Item = Result<Coord, PyramidError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(coord) = self.pending.pop_front() {
                return Some(Ok(coord));
            }
            let leaf = self.leaves.next()?;
            if let Err(err) = self.expand(leaf) {
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(zoom: u8, column: u64, row: u64) -> Coord {
        Coord::new(zoom, column, row).unwrap()
    }

    fn collect(leaves: Vec<Coord>, target: Option<u8>) -> Vec<Coord> {
        explode(leaves, target)
            .collect::<Result<Vec<_>, _>>()
            .expect("explosion should succeed")
    }

    #[test]
    fn test_single_leaf_ancestor_chain() {
        let tiles = collect(vec![coord(5, 10, 7)], Some(3));
        assert_eq!(tiles, vec![coord(5, 10, 7), coord(4, 5, 3), coord(3, 2, 1)]);
    }

    #[test]
    fn test_sibling_leaves_share_ancestors() {
        // (5,10,7) and (5,11,7) share the same parent at zoom 4; the
        // shared chain must be emitted exactly once.
        let tiles = collect(vec![coord(5, 10, 7), coord(5, 11, 7)], Some(3));
        assert_eq!(
            tiles,
            vec![
                coord(5, 10, 7),
                coord(4, 5, 3),
                coord(3, 2, 1),
                coord(5, 11, 7),
            ]
        );
    }

    #[test]
    fn test_duplicate_leaf_emitted_once() {
        let tiles = collect(vec![coord(5, 10, 7), coord(5, 10, 7)], Some(4));
        assert_eq!(tiles, vec![coord(5, 10, 7), coord(4, 5, 3)]);
    }

    #[test]
    fn test_default_target_is_root() {
        let tiles = collect(vec![coord(3, 7, 7)], None);
        assert_eq!(
            tiles,
            vec![coord(3, 7, 7), coord(2, 3, 3), coord(1, 1, 1), coord(0, 0, 0)]
        );
    }

    #[test]
    fn test_leaf_at_target_yields_only_itself() {
        let tiles = collect(vec![coord(3, 2, 1)], Some(3));
        assert_eq!(tiles, vec![coord(3, 2, 1)]);
    }

    #[test]
    fn test_target_below_leaf_is_error_for_that_leaf() {
        let results: Vec<_> = explode(vec![coord(2, 1, 1), coord(5, 10, 7)], Some(4)).collect();
        assert_eq!(
            results[0],
            Err(PyramidError::TargetBelowLeaf {
                leaf: coord(2, 1, 1),
                target: 4
            })
        );
        // The stream continues past the offending leaf
        assert_eq!(results[1], Ok(coord(5, 10, 7)));
        assert_eq!(results[2], Ok(coord(4, 5, 3)));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_lazy_no_input_materialization() {
        // An effectively unbounded input still yields the first items;
        // take() would hang if the iterator drained its input eagerly.
        let endless = (0..u64::MAX).map(|i| coord(10, i % 1024, (i / 1024) % 1024));
        let first: Vec<_> = explode(endless, Some(9)).take(2).collect();
        assert_eq!(first.len(), 2);
    }
}
