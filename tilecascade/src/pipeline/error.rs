//! Error types for the propagation and seeding pipelines.

use crate::index::IndexError;
use crate::metro::MetroExtractError;
use crate::queue::QueueError;
use thiserror::Error;

/// Whole-operation pipeline failures.
///
/// Per-item problems (a malformed expired line, a leaf below the target
/// zoom) are logged and skipped inside the stream; everything here aborts
/// the run and leaves the source expired file intact.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Expired-tile file missing or unreadable, or cleanup failed
    #[error("expired file error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache index backend failed mid-stream
    #[error("cache index failed: {0}")]
    Index(#[from] IndexError),

    /// Queue backend rejected the run
    #[error("work queue failed: {0}")]
    Queue(#[from] QueueError),

    /// Metro extract document could not be parsed
    #[error("metro extract failed: {0}")]
    Metro(#[from] MetroExtractError),

    /// Inconsistent run configuration; a programmer or operator error
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
}
