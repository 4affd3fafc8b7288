//! Metro-extract bounding boxes.
//!
//! Parses the metro-extracts JSON document (regions, each holding cities
//! with a `bbox`) into [`Bounds`] values used to scope seeding. Fetching
//! the document is the caller's problem; this module only takes a reader.

use crate::coord::{Bounds, CoordError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;

/// One city entry from a metro-extracts document.
#[derive(Debug, Clone, PartialEq)]
pub struct MetroExtractCity {
    /// Region the city is grouped under
    pub region: String,
    /// City name
    pub city: String,
    /// Geographic bounding box of the extract
    pub bounds: Bounds,
}

/// Errors parsing a metro-extracts document.
#[derive(Debug, thiserror::Error)]
pub enum MetroExtractError {
    /// Document is not valid JSON or misses required structure
    #[error("malformed metro extract document: {0}")]
    Json(#[from] serde_json::Error),

    /// A bbox field was neither a number nor a numeric string
    #[error("metro extract bbox field '{0}' is not a number")]
    InvalidNumber(String),

    /// A bbox does not form a valid bounding box
    #[error("metro extract bbox invalid: {0}")]
    Bounds(#[from] CoordError),
}

/// bbox fields appear both as JSON numbers and as numeric strings in
/// the wild, so accept either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BboxField {
    Number(f64),
    Text(String),
}

impl BboxField {
    fn as_f64(&self) -> Result<f64, MetroExtractError> {
        match self {
            BboxField::Number(value) => Ok(*value),
            BboxField::Text(text) => text
                .parse()
                .map_err(|_| MetroExtractError::InvalidNumber(text.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BboxDoc {
    top: BboxField,
    left: BboxField,
    bottom: BboxField,
    right: BboxField,
}

#[derive(Debug, Deserialize)]
struct CityDoc {
    bbox: BboxDoc,
}

#[derive(Debug, Deserialize)]
struct RegionDoc {
    cities: BTreeMap<String, CityDoc>,
}

#[derive(Debug, Deserialize)]
struct MetroExtractDoc {
    regions: BTreeMap<String, RegionDoc>,
}

/// Parses a metro-extracts document into its city entries.
///
/// # Errors
///
/// Returns a `MetroExtractError` when the document is malformed; there
/// is no partial result.
pub fn parse_metro_extract(reader: impl Read) -> Result<Vec<MetroExtractCity>, MetroExtractError> {
    let doc: MetroExtractDoc = serde_json::from_reader(reader)?;

    let mut cities = Vec::new();
    for (region_name, region) in doc.regions {
        for (city_name, city) in region.cities {
            let bounds = Bounds::new(
                city.bbox.bottom.as_f64()?,
                city.bbox.left.as_f64()?,
                city.bbox.top.as_f64()?,
                city.bbox.right.as_f64()?,
            )?;
            cities.push(MetroExtractCity {
                region: region_name.clone(),
                city: city_name,
                bounds,
            });
        }
    }
    Ok(cities)
}

/// Collects the bounding boxes of every city in the extract.
pub fn city_bounds(cities: &[MetroExtractCity]) -> Vec<Bounds> {
    cities.iter().map(|city| city.bounds).collect()
}
