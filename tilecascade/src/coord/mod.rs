//! Coordinate model
//!
//! Provides the quadtree tile coordinate type, text parsing/formatting,
//! the compact wire token used for set storage and queue payloads, and
//! conversions between geographic coordinates (latitude/longitude) and
//! Web Mercator tile coordinates.

mod types;
mod wire;

pub use types::{
    Bounds, Coord, CoordError, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM,
};
pub use wire::{CoordToken, DecodeError, TOKEN_LEN};

use std::f64::consts::PI;

/// Converts geographic coordinates to the tile containing them.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 20)
///
/// The eastern and southern extremes map onto the last tile of the grid
/// rather than one past it, so inclusive bounding boxes stay in range.
///
/// # Errors
///
/// Returns a `CoordError` when any input is outside its valid range.
#[inline]
pub fn tile_for_lat_lon(lat: f64, lon: f64, zoom: u8) -> Result<Coord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let last = (1u64 << zoom) - 1;

    let column = (((lon + 180.0) / 360.0 * n) as u64).min(last);

    // Web Mercator projection for the row
    let lat_rad = lat * PI / 180.0;
    let row = ((((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n) as u64).min(last);

    Ok(Coord { zoom, column, row })
}

/// Converts a tile coordinate back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(coord: &Coord) -> (f64, f64) {
    let n = 2.0_f64.powi(coord.zoom as i32);

    let lon = coord.column as f64 / n * 360.0 - 180.0;

    let y = coord.row as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}
