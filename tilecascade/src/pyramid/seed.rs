//! Seed tile generation.
//!
//! Produces every tile of a zoom range, either for the whole world or for
//! the tiles whose footprint intersects a geographic bounding box. Used to
//! seed full pyramids for a region rather than to propagate expirations.

use crate::coord::{tile_for_lat_lon, Bounds, Coord, CoordError};

/// Yields every tile at every zoom level in `zoom_start..=zoom_until`.
///
/// Zoom levels are emitted coarse to fine, row-major within a level. An
/// inverted range yields nothing.
pub fn seed_tiles(zoom_start: u8, zoom_until: u8) -> SeedTiles {
    SeedTiles {
        zoom: zoom_start,
        zoom_until,
        column: 0,
        row: 0,
    }
}

/// Iterator produced by [`seed_tiles`].
#[derive(Debug, Clone)]
pub struct SeedTiles {
    zoom: u8,
    zoom_until: u8,
    column: u64,
    row: u64,
}

impl Iterator for SeedTiles {
    type Item = Coord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.zoom > self.zoom_until {
            return None;
        }
        let coord = Coord {
            zoom: self.zoom,
            column: self.column,
            row: self.row,
        };

        let n = 1u64 << self.zoom;
        self.column += 1;
        if self.column == n {
            self.column = 0;
            self.row += 1;
            if self.row == n {
                self.row = 0;
                self.zoom += 1;
            }
        }
        Some(coord)
    }
}

/// Yields every tile between `zoom_start` and `zoom_until` (inclusive)
/// whose footprint intersects `bounds`.
///
/// Boundary tiles are included: the corner tiles are computed with the
/// same projection used for membership tests, and the ranges are
/// inclusive on both ends, so a box exactly covering a tile's footprint
/// always produces that tile.
///
/// # Errors
///
/// Returns a `CoordError` if the zoom range is invalid.
pub fn tiles_for_bounds(
    bounds: Bounds,
    zoom_start: u8,
    zoom_until: u8,
) -> Result<BoundsTiles, CoordError> {
    if zoom_until > crate::coord::MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom_until));
    }
    Ok(BoundsTiles {
        bounds,
        zoom: zoom_start,
        zoom_until,
        range: None,
    })
}

/// Chains [`tiles_for_bounds`] over several bounding boxes.
///
/// Overlapping boxes produce duplicate tiles; deduplication is the
/// caller's choice since it forces a set into memory.
pub fn tiles_for_multiple_bounds(
    bounds: Vec<Bounds>,
    zoom_start: u8,
    zoom_until: u8,
) -> Result<impl Iterator<Item = Coord>, CoordError> {
    let mut generators = Vec::with_capacity(bounds.len());
    for b in bounds {
        generators.push(tiles_for_bounds(b, zoom_start, zoom_until)?);
    }
    Ok(generators.into_iter().flatten())
}

/// Per-zoom tile window over a bounding box.
#[derive(Debug, Clone)]
struct TileWindow {
    min_column: u64,
    max_column: u64,
    max_row: u64,
    column: u64,
    row: u64,
}

/// Iterator produced by [`tiles_for_bounds`].
#[derive(Debug, Clone)]
pub struct BoundsTiles {
    bounds: Bounds,
    zoom: u8,
    zoom_until: u8,
    range: Option<TileWindow>,
}

impl BoundsTiles {
    fn window_for_zoom(&self, zoom: u8) -> TileWindow {
        // The northwest corner has the smallest column and row. The
        // projection clamps the east/south extremes onto the grid, so the
        // unwraps cannot fire for a validated Bounds.
        let nw = tile_for_lat_lon(self.bounds.max_lat, self.bounds.min_lon, zoom)
            .expect("bounds validated at construction");
        let se = tile_for_lat_lon(self.bounds.min_lat, self.bounds.max_lon, zoom)
            .expect("bounds validated at construction");
        TileWindow {
            min_column: nw.column,
            max_column: se.column,
            max_row: se.row,
            column: nw.column,
            row: nw.row,
        }
    }
}

impl Iterator for BoundsTiles {
    type Item = Coord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.zoom > self.zoom_until {
            return None;
        }
        if self.range.is_none() {
            self.range = Some(self.window_for_zoom(self.zoom));
        }
        let window = self.range.as_mut().expect("window just installed");

        let coord = Coord {
            zoom: self.zoom,
            column: window.column,
            row: window.row,
        };

        // Advance row-major; at the end of the window, move to the next zoom
        if window.column == window.max_column {
            if window.row == window.max_row {
                self.zoom += 1;
                self.range = None;
            } else {
                window.column = window.min_column;
                window.row += 1;
            }
        } else {
            window.column += 1;
        }
        Some(coord)
    }
}
