//! Core value types for the local candle cache.
//!
//! Defines the timestamp and interval contracts the cache relies on and the
//! [`Source`] capability implemented by remote candle providers.

pub mod interval;
pub mod source;
pub mod timestamp;

pub use interval::{Interval, IntervalParseError};
pub use source::{PageBounds, Source, SourceError};
pub use timestamp::{Timestamp, TimestampParseError};

/// Name of the timestamp column present in every cached row.
pub const TS_COLUMN: &str = "ts";
