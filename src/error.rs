//! Error types for cache loads.

use std::io;
use std::path::PathBuf;

use candles_core::{SourceError, Timestamp};
use candles_store::StoreError;
use thiserror::Error;

use crate::sources::RegistryError;

/// Errors from [`crate::RangeCache`] operations.
///
/// Fetch and read failures are never retried or healed; they surface to the
/// caller as-is.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("fetch from {slug} at probe {} failed: {source}", .probe.as_secs())]
    Fetch {
        slug: String,
        probe: Timestamp,
        source: SourceError,
    },

    #[error("failed to read segment {}: {source}", .path.display())]
    SegmentRead { path: PathBuf, source: csv::Error },

    #[error("segment {} has no column '{column}'", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("segment {} record {record}: invalid value '{value}' in column '{column}'", .path.display())]
    InvalidValue {
        path: PathBuf,
        record: u64,
        column: String,
        value: String,
    },

    #[error("invalid cache root {}: {reason}", .path.display())]
    InvalidCacheRoot { path: PathBuf, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
