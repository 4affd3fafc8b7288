//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Supported zoom levels for the tile pyramid
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 20;

/// Tile coordinate in a Web Mercator / slippy-map quadtree pyramid.
///
/// Field order matters: deriving `Ord` gives the structural
/// (zoom, column, row) ordering that set storage and tests rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    /// Zoom level (0-20)
    pub zoom: u8,
    /// X coordinate (east-west), 0 at west
    pub column: u64,
    /// Y coordinate (north-south), 0 at north
    pub row: u64,
}

impl Coord {
    /// Creates a coordinate, validating zoom and column/row bounds.
    ///
    /// # Errors
    ///
    /// Returns `CoordError::InvalidZoom` when `zoom > 20`, and
    /// `CoordError::OutOfBounds` when column or row is not below `2^zoom`.
    pub fn new(zoom: u8, column: u64, row: u64) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let n = 1u64 << zoom;
        if column >= n || row >= n {
            return Err(CoordError::OutOfBounds { zoom, column, row });
        }
        Ok(Self { zoom, column, row })
    }

    /// Returns the parent tile one zoom level up, or `None` at the root.
    ///
    /// The parent of `(z, x, y)` is `(z-1, x/2, y/2)` with floor division,
    /// so all four children of a tile map to the same parent.
    #[inline]
    pub fn parent(&self) -> Option<Coord> {
        if self.zoom == 0 {
            return None;
        }
        Some(Coord {
            zoom: self.zoom - 1,
            column: self.column / 2,
            row: self.row / 2,
        })
    }

    /// Returns the ancestor of this tile at `zoom`.
    ///
    /// # Errors
    ///
    /// Returns `CoordError::InvalidZoom` if `zoom` is finer than this
    /// tile's own zoom (a tile has no ancestor below itself).
    pub fn ancestor(&self, zoom: u8) -> Result<Coord, CoordError> {
        if zoom > self.zoom {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let shift = self.zoom - zoom;
        Ok(Coord {
            zoom,
            column: self.column >> shift,
            row: self.row >> shift,
        })
    }
}

/// Formats as `zoom/column/row`, the exact inverse of [`Coord::from_str`].
impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Parses `"zoom/column/row"`, tolerating surrounding whitespace.
impl FromStr for Coord {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut fields = trimmed.split('/');
        let (zoom, column, row) = match (fields.next(), fields.next(), fields.next(), fields.next())
        {
            (Some(z), Some(x), Some(y), None) => (z.trim(), x.trim(), y.trim()),
            _ => return Err(CoordError::InvalidFormat(trimmed.to_string())),
        };
        let zoom: u8 = zoom
            .parse()
            .map_err(|_| CoordError::InvalidFormat(trimmed.to_string()))?;
        let column: u64 = column
            .parse()
            .map_err(|_| CoordError::InvalidFormat(trimmed.to_string()))?;
        let row: u64 = row
            .parse()
            .map_err(|_| CoordError::InvalidFormat(trimmed.to_string()))?;
        Coord::new(zoom, column, row)
    }
}

/// Geographic bounding box in degrees.
///
/// Latitude grows northward, longitude eastward; `min_lat`/`min_lon` is the
/// southwest corner. Used to scope seeding to a region of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Southern edge latitude
    pub min_lat: f64,
    /// Western edge longitude
    pub min_lon: f64,
    /// Northern edge latitude
    pub max_lat: f64,
    /// Eastern edge longitude
    pub max_lon: f64,
}

impl Bounds {
    /// Creates a bounding box from corner coordinates.
    ///
    /// # Errors
    ///
    /// Returns `CoordError::InvalidBounds` if the corners are not ordered
    /// (south <= north, west <= east) or fall outside the valid ranges.
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self, CoordError> {
        let ordered = min_lat <= max_lat && min_lon <= max_lon;
        let in_range = (MIN_LAT..=MAX_LAT).contains(&min_lat)
            && (MIN_LAT..=MAX_LAT).contains(&max_lat)
            && (MIN_LON..=MAX_LON).contains(&min_lon)
            && (MIN_LON..=MAX_LON).contains(&max_lon);
        if !ordered || !in_range {
            return Err(CoordError::InvalidBounds {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            });
        }
        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }
}

/// Errors that can occur constructing or parsing coordinates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordError {
    /// Text did not match `zoom/column/row` with integer fields
    #[error("invalid coordinate text: '{0}' (expected zoom/column/row)")]
    InvalidFormat(String),

    /// Zoom level is outside the supported range (0 to 20)
    #[error("invalid zoom level: {0} (must be between {MIN_ZOOM} and {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Column or row does not fit the grid at the given zoom
    #[error("tile {column},{row} out of bounds at zoom {zoom}")]
    OutOfBounds { zoom: u8, column: u64, row: u64 },

    /// Latitude is outside the Web Mercator range
    #[error("invalid latitude: {0} (must be between {MIN_LAT} and {MAX_LAT})")]
    InvalidLatitude(f64),

    /// Longitude is outside the valid range
    #[error("invalid longitude: {0} (must be between {MIN_LON} and {MAX_LON})")]
    InvalidLongitude(f64),

    /// Bounding box corners are inverted or out of range
    #[error("invalid bounds: ({min_lat}, {min_lon}) to ({max_lat}, {max_lon})")]
    InvalidBounds {
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    },
}
