//! tilecascade - Expired map-tile propagation engine
//!
//! When map data changes, renderers emit lists of expired tiles at a
//! single zoom level. This library turns those lists into the full set
//! of work to re-render: each expired leaf is exploded into its chain
//! of quadtree ancestors, deduplicated against a cache index of
//! already-rendered tiles, and fanned out onto a work queue.
//!
//! # High-Level API
//!
//! The [`pipeline`] module ties the layers together:
//!
//! ```ignore
//! use tilecascade::pipeline::{propagate, PropagateConfig};
//! use tilecascade::queue::{make_queue, QueueKind};
//!
//! let queue = make_queue(&QueueKind::Memory)?;
//! let config = PropagateConfig::new("expired_tiles.txt").explode_until(10);
//! let summary = propagate(&config, None, &*queue)?;
//! ```

pub mod config;
pub mod coord;
pub mod index;
pub mod logging;
pub mod metro;
pub mod pipeline;
pub mod pyramid;
pub mod queue;
pub mod worker;

/// Version of the tilecascade library and CLI.
///
/// Synchronized across the workspace from `Cargo.toml` at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
