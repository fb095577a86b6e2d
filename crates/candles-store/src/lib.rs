//! Segment store for the local candle cache.
//!
//! Each source partition lives in `<cache_root>/<slug>/` and holds one CSV
//! file per fetched page:
//!
//! - `<first>_<last>.csv` for complete segments
//! - `<first>_.csv` for the open (frontier) segment
//! - `<probe>.csv` transiently, while a page is being fetched
//!
//! Segments are never merged or rewritten. They are created by renaming a
//! finished temp file into place and deleted only when a complete page
//! supersedes an open one.

mod segment;
mod store;

pub use segment::{Segment, SegmentBounds, SEGMENT_EXTENSION};
pub use store::{SegmentStore, StoreError, StoreResult};
