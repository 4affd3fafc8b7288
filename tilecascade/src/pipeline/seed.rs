//! The seed workflow.
//!
//! Builds the set of tiles to pre-render: the full pyramid between two
//! zoom levels, optionally narrowed to metro-extract bounding boxes from
//! a cutover zoom downward. The generated stream can be pushed into a
//! work queue or written straight into a cache index.

use crate::coord::{Bounds, Coord, CoordToken, MAX_ZOOM};
use crate::index::{CacheIndex, Progress};
use crate::pipeline::PipelineError;
use crate::pyramid::{seed_tiles, tiles_for_multiple_bounds};
use crate::queue::TileQueue;
use std::collections::HashSet;
use tracing::info;

/// Narrows seeding to metro bounding boxes from `filter_zoom` onward.
///
/// Zooms below `filter_zoom` are seeded world-wide; from `filter_zoom`
/// to the end of the range only tiles inside one of the boxes are
/// produced.
#[derive(Debug, Clone)]
pub struct MetroSeed {
    pub bounds: Vec<Bounds>,
    pub filter_zoom: u8,
}

/// Configuration for one seed generation.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Coarsest zoom to seed (inclusive)
    pub zoom_start: u8,
    /// Finest zoom to seed (inclusive)
    pub zoom_until: u8,
    /// Metro narrowing, `None` seeds the whole world at every zoom
    pub metro: Option<MetroSeed>,
    /// Deduplicate tiles produced by overlapping metro boxes. Holds
    /// every emitted token in memory, so leave off for deep pyramids.
    pub unique: bool,
}

impl SeedConfig {
    /// Creates a world-wide seed over `zoom_start..=zoom_until`.
    pub fn new(zoom_start: u8, zoom_until: u8) -> Self {
        Self {
            zoom_start,
            zoom_until,
            metro: None,
            unique: false,
        }
    }

    /// Narrows zooms from `filter_zoom` onward to the given boxes.
    pub fn with_metro(mut self, bounds: Vec<Bounds>, filter_zoom: u8) -> Self {
        self.metro = Some(MetroSeed {
            bounds,
            filter_zoom,
        });
        self
    }

    /// Enables in-memory deduplication of the generated stream.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.zoom_start > self.zoom_until {
            return Err(PipelineError::Config(format!(
                "zoom range is inverted: start {} exceeds until {}",
                self.zoom_start, self.zoom_until
            )));
        }
        if self.zoom_until > MAX_ZOOM {
            return Err(PipelineError::Config(format!(
                "zoom until {} exceeds the maximum zoom {MAX_ZOOM}",
                self.zoom_until
            )));
        }
        if let Some(metro) = &self.metro {
            if metro.filter_zoom == 0 {
                return Err(PipelineError::Config(
                    "metro filter zoom must be at least 1".to_string(),
                ));
            }
            if self.zoom_start > metro.filter_zoom - 1 {
                return Err(PipelineError::Config(format!(
                    "zoom start {} must not exceed the zoom below the metro filter ({})",
                    self.zoom_start,
                    metro.filter_zoom - 1
                )));
            }
            if metro.filter_zoom > self.zoom_until {
                return Err(PipelineError::Config(format!(
                    "metro filter zoom {} exceeds zoom until {}",
                    metro.filter_zoom, self.zoom_until
                )));
            }
        }
        Ok(())
    }
}

/// Builds the seed tile stream described by `config`.
///
/// # Errors
///
/// Returns `PipelineError::Config` for an inconsistent zoom range or
/// metro cutover.
pub fn make_seed_generator(
    config: &SeedConfig,
) -> Result<Box<dyn Iterator<Item = Coord>>, PipelineError> {
    config.validate()?;

    let stream: Box<dyn Iterator<Item = Coord>> = match &config.metro {
        Some(metro) => {
            let world = seed_tiles(config.zoom_start, metro.filter_zoom - 1);
            let narrowed = tiles_for_multiple_bounds(
                metro.bounds.clone(),
                metro.filter_zoom,
                config.zoom_until,
            )
            .map_err(|err| PipelineError::Config(err.to_string()))?;
            Box::new(world.chain(narrowed))
        }
        None => Box::new(seed_tiles(config.zoom_start, config.zoom_until)),
    };

    if config.unique {
        let mut seen: HashSet<CoordToken> = HashSet::new();
        Ok(Box::new(
            stream.filter(move |coord| seen.insert(coord.to_token())),
        ))
    } else {
        Ok(stream)
    }
}

/// Generates seed tiles and pushes them into a work queue.
///
/// # Errors
///
/// Returns a `PipelineError` for an invalid configuration or a queue
/// rejection.
pub fn seed_into_queue(
    config: &SeedConfig,
    queue: &dyn TileQueue,
) -> Result<u64, PipelineError> {
    info!(
        zoom_start = config.zoom_start,
        zoom_until = config.zoom_until,
        metro = config.metro.is_some(),
        "seeding tiles into queue"
    );
    let mut tiles = make_seed_generator(config)?;
    let enqueued = queue.enqueue_batch(&mut tiles)?;
    info!(enqueued, "seed enqueue complete");
    Ok(enqueued)
}

/// Generates seed tiles and records them all in a cache index,
/// marking the whole range as already rendered.
///
/// # Errors
///
/// Returns a `PipelineError` for an invalid configuration or an index
/// backend failure.
pub fn seed_into_index(
    config: &SeedConfig,
    index: &dyn CacheIndex,
    progress: &Progress,
) -> Result<u64, PipelineError> {
    info!(
        zoom_start = config.zoom_start,
        zoom_until = config.zoom_until,
        "seeding tiles into cache index"
    );
    let tiles = make_seed_generator(config)?;
    let written = index.write(Box::new(tiles), progress)?;
    info!(written, "seed index write complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryCacheIndex;
    use crate::queue::MemoryQueue;

    fn collect(config: &SeedConfig) -> Vec<Coord> {
        make_seed_generator(config).unwrap().collect()
    }

    #[test]
    fn test_world_seed_counts_per_zoom() {
        let tiles = collect(&SeedConfig::new(0, 2));
        // 1 + 4 + 16
        assert_eq!(tiles.len(), 21);
        assert_eq!(tiles[0], Coord::new(0, 0, 0).unwrap());
        assert_eq!(tiles[1].zoom, 1);
        assert_eq!(tiles[5].zoom, 2);
    }

    #[test]
    fn test_metro_seed_is_worldwide_below_filter() {
        let bounds = vec![Bounds::new(40.0, -75.0, 41.0, -73.0).unwrap()];
        let config = SeedConfig::new(0, 4).with_metro(bounds, 3);
        let tiles = collect(&config);

        let world: Vec<_> = tiles.iter().filter(|c| c.zoom < 3).collect();
        assert_eq!(world.len(), 21, "zooms 0..=2 stay worldwide");
        assert!(
            tiles.iter().filter(|c| c.zoom == 4).count() < 256,
            "filtered zoom covers a fraction of the world"
        );
        assert!(tiles.iter().any(|c| c.zoom == 4));
    }

    #[test]
    fn test_overlapping_boxes_deduplicate_with_unique() {
        let a = Bounds::new(40.0, -75.0, 41.0, -73.0).unwrap();
        let config = SeedConfig::new(0, 4).with_metro(vec![a, a], 3);

        let duplicated = collect(&config);
        let deduplicated = collect(&config.clone().unique());
        assert!(deduplicated.len() < duplicated.len());

        let mut unique_check = HashSet::new();
        for coord in &deduplicated {
            assert!(unique_check.insert(*coord), "duplicate {coord} survived");
        }
    }

    #[test]
    fn test_inverted_zoom_range_rejected() {
        assert!(matches!(
            make_seed_generator(&SeedConfig::new(5, 3)),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_metro_filter_zoom_zero_rejected() {
        let bounds = vec![Bounds::new(40.0, -75.0, 41.0, -73.0).unwrap()];
        let mut config = SeedConfig::new(0, 4).with_metro(bounds, 3);
        config.metro.as_mut().unwrap().filter_zoom = 0;
        assert!(matches!(
            make_seed_generator(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_start_must_precede_metro_filter() {
        let bounds = vec![Bounds::new(40.0, -75.0, 41.0, -73.0).unwrap()];
        let config = SeedConfig::new(3, 4).with_metro(bounds, 3);
        assert!(matches!(
            make_seed_generator(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_seed_into_queue_reports_count() {
        let queue = MemoryQueue::new();
        let enqueued = seed_into_queue(&SeedConfig::new(0, 1), &queue).unwrap();
        assert_eq!(enqueued, 5);
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_seed_into_index_marks_tiles_cached() {
        let index = MemoryCacheIndex::new("seeded");
        let written =
            seed_into_index(&SeedConfig::new(0, 1), &index, &Progress::default()).unwrap();
        assert_eq!(written, 5);
        assert_eq!(index.len(), 5);
    }
}
