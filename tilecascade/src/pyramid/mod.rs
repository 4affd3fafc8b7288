//! Tile pyramid exploration
//!
//! Generates coordinate sequences over the quadtree pyramid: full-pyramid
//! and bounding-box seeding for a zoom range, and the explode algorithm
//! that expands expired leaf tiles into their ancestor chains with
//! cross-leaf deduplication. All generators are lazy single-pass
//! iterators so callers can stream inputs far larger than memory.

mod explode;
mod seed;

pub use explode::{explode, Explode, PyramidError};
pub use seed::{
    seed_tiles, tiles_for_bounds, tiles_for_multiple_bounds, BoundsTiles, SeedTiles,
};
