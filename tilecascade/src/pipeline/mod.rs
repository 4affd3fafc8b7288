//! Tile workflows built from the lower layers.
//!
//! The propagation run ([`propagate`]) turns an expired-tile file into
//! queued work; the seed workflow ([`seed_into_queue`],
//! [`seed_into_index`]) pre-populates a queue or cache index for a zoom
//! range or metro region.

mod error;
mod expired;
mod propagate;
mod seed;

pub use error::PipelineError;
pub use expired::{ExpiredCoords, ReadStats};
pub use propagate::{
    propagate, PropagateConfig, RunPhase, RunSummary, DEFAULT_PROGRESS_INTERVAL,
};
pub use seed::{
    make_seed_generator, seed_into_index, seed_into_queue, MetroSeed, SeedConfig,
};
