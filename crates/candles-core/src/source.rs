//! The capability the cache needs from a remote candle source.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::Timestamp;

/// Errors raised while fetching a page from a remote source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("source returned no rows for probe {probe}")]
    EmptyPage { probe: Timestamp },

    #[error("failed to write page: {0}")]
    Write(String),

    #[error("{0}")]
    Other(String),
}

/// Inclusive bounds of one fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    /// Timestamp of the first row written.
    pub first: Timestamp,
    /// Timestamp of the last row written.
    pub last: Timestamp,
    /// `true` when the page can no longer grow and more data may follow;
    /// `false` when the page reaches the live frontier.
    pub completed: bool,
}

impl PageBounds {
    pub fn new(first: Timestamp, last: Timestamp, completed: bool) -> Self {
        Self {
            first,
            last,
            completed,
        }
    }
}

/// A paginated, time-ordered candle source.
///
/// Implementations serialize and rate-limit their own outbound traffic;
/// `fetch_page` blocks until the page is written or the fetch failed.
pub trait Source {
    /// Stable partition key, e.g. `binance_usdm_futures_ohlc/btcusdt_1h`.
    ///
    /// May contain `/`, in which case the partition is a nested directory.
    fn slug(&self) -> String;

    /// Columns written after `ts`, in file order.
    fn columns(&self) -> &[&str];

    /// Fetch one page starting at or after a block-aligned point derived
    /// from `probe` and write it to `dest` as CSV with a `ts` header column
    /// followed by [`Source::columns`].
    fn fetch_page(&self, probe: Timestamp, dest: &Path) -> Result<PageBounds, SourceError>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn slug(&self) -> String {
        (**self).slug()
    }

    fn columns(&self) -> &[&str] {
        (**self).columns()
    }

    fn fetch_page(&self, probe: Timestamp, dest: &Path) -> Result<PageBounds, SourceError> {
        (**self).fetch_page(probe, dest)
    }
}
