//! Compact wire encoding for coordinates.
//!
//! A [`CoordToken`] is the fixed-width binary form of a [`Coord`] used as
//! the cache-index record format and the durable queue payload. The layout
//! is big-endian `[zoom:1][column:8][row:8]`, so byte-lexicographic token
//! order equals the structural (zoom, column, row) ordering of `Coord`.
//! The encoding is persisted, so it must stay stable across releases.

use super::types::{Coord, MAX_ZOOM};
use std::fmt;

/// Fixed token width in bytes.
pub const TOKEN_LEN: usize = 17;

/// Fixed-width serialized form of a [`Coord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordToken([u8; TOKEN_LEN]);

impl CoordToken {
    /// Decodes a token back into a coordinate.
    ///
    /// A failure here indicates storage corruption, so callers treat it as
    /// fatal to the operation reading the token.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Length` for slices that are not exactly
    /// [`TOKEN_LEN`] bytes, and `DecodeError::OutOfRange` when the decoded
    /// fields violate the coordinate invariants.
    pub fn decode(bytes: &[u8]) -> Result<Coord, DecodeError> {
        let bytes: &[u8; TOKEN_LEN] = bytes
            .try_into()
            .map_err(|_| DecodeError::Length(bytes.len()))?;

        let zoom = bytes[0];
        let column = u64::from_be_bytes(bytes[1..9].try_into().unwrap());
        let row = u64::from_be_bytes(bytes[9..17].try_into().unwrap());

        if zoom > MAX_ZOOM || column >= (1u64 << zoom) || row >= (1u64 << zoom) {
            return Err(DecodeError::OutOfRange { zoom, column, row });
        }
        Ok(Coord { zoom, column, row })
    }

    /// Returns the raw token bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl Coord {
    /// Encodes this coordinate into its fixed-width token.
    ///
    /// Total over the valid coordinate domain; `CoordToken::decode` is the
    /// exact inverse.
    #[inline]
    pub fn to_token(&self) -> CoordToken {
        let mut bytes = [0u8; TOKEN_LEN];
        bytes[0] = self.zoom;
        bytes[1..9].copy_from_slice(&self.column.to_be_bytes());
        bytes[9..17].copy_from_slice(&self.row.to_be_bytes());
        CoordToken(bytes)
    }
}

impl fmt::Display for CoordToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors that can occur decoding a wire token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Token was not exactly [`TOKEN_LEN`] bytes
    #[error("token length {0} (expected {TOKEN_LEN} bytes)")]
    Length(usize),

    /// Decoded fields violate the coordinate invariants
    #[error("decoded tile {column},{row} invalid at zoom {zoom}")]
    OutOfRange { zoom: u8, column: u64, row: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for coord in [
            Coord::new(0, 0, 0).unwrap(),
            Coord::new(5, 10, 7).unwrap(),
            Coord::new(10, 512, 512).unwrap(),
            Coord::new(20, (1 << 20) - 1, (1 << 20) - 1).unwrap(),
        ] {
            let token = coord.to_token();
            assert_eq!(
                CoordToken::decode(token.as_bytes()).unwrap(),
                coord,
                "decode(encode(c)) must equal c for {coord}"
            );
        }
    }

    #[test]
    fn test_token_is_fixed_width() {
        let small = Coord::new(0, 0, 0).unwrap().to_token();
        let large = Coord::new(20, 1_000_000, 1_000_000).unwrap().to_token();
        assert_eq!(small.as_bytes().len(), TOKEN_LEN);
        assert_eq!(large.as_bytes().len(), TOKEN_LEN);
    }

    #[test]
    fn test_byte_order_matches_coord_order() {
        let coords = [
            Coord::new(3, 2, 1).unwrap(),
            Coord::new(5, 10, 6).unwrap(),
            Coord::new(5, 10, 7).unwrap(),
            Coord::new(5, 11, 0).unwrap(),
            Coord::new(6, 0, 0).unwrap(),
        ];
        for pair in coords.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(
                pair[0].to_token().as_bytes() < pair[1].to_token().as_bytes(),
                "token bytes must sort like coordinates: {} vs {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(CoordToken::decode(&[0u8; 3]), Err(DecodeError::Length(3)));
        assert_eq!(CoordToken::decode(&[]), Err(DecodeError::Length(0)));
    }

    #[test]
    fn test_decode_rejects_corrupt_fields() {
        // zoom byte above the supported maximum
        let mut bytes = [0u8; TOKEN_LEN];
        bytes[0] = 42;
        assert!(matches!(
            CoordToken::decode(&bytes),
            Err(DecodeError::OutOfRange { zoom: 42, .. })
        ));

        // column too large for zoom 2
        let mut bytes = [0u8; TOKEN_LEN];
        bytes[0] = 2;
        bytes[1..9].copy_from_slice(&4u64.to_be_bytes());
        assert!(matches!(
            CoordToken::decode(&bytes),
            Err(DecodeError::OutOfRange { .. })
        ));
    }
}
