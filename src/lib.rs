//! Local incremental cache for paginated OHLC candle sources.
//!
//! A [`RangeCache`] answers "give me candles in `[start, stop)`" by stitching
//! segment files already on disk with pages fetched from a [`Source`] for the
//! gaps. Each fetched page is published atomically under the cache root as
//! `<slug>/<first>_<last>.csv` (a full page) or `<slug>/<first>_.csv` (the
//! frontier page, which may still grow).
//!
//! ```no_run
//! use local_candles::{load_candles, Interval, Settings, SourceSpec, Timestamp};
//!
//! let settings = Settings::default();
//! let spec = SourceSpec::new(
//!     "binance_usdm_futures_ohlc",
//!     "BTCUSDT",
//!     Interval::from_slug("1h").unwrap(),
//! );
//! let table = load_candles(
//!     &settings,
//!     &spec,
//!     Timestamp::parse("2024-01-01").unwrap(),
//!     Timestamp::parse("2024-02-01").unwrap(),
//!     None,
//! )
//! .unwrap();
//! println!("{} rows", table.len());
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod sources;
pub mod table;

pub use cache::{LoadReport, RangeCache, StopReason};
pub use candles_core::{Interval, PageBounds, Source, SourceError, Timestamp, TS_COLUMN};
pub use candles_store::{Segment, SegmentBounds, SegmentStore, StoreError};
pub use config::{ConfigError, Settings};
pub use error::{CacheError, CacheResult};
pub use sources::{SourceRegistry, SourceSpec};
pub use table::CandleTable;

/// Load `[start, stop)` from a named source using `settings`.
///
/// `columns` defaults to `settings.default_columns`.
pub fn load_candles(
    settings: &Settings,
    spec: &SourceSpec,
    start: Timestamp,
    stop: Timestamp,
    columns: Option<&[&str]>,
) -> CacheResult<CandleTable> {
    let registry = SourceRegistry::new(settings);
    let source = registry.build(spec)?;
    let cache = RangeCache::new(&settings.cache_root)?;

    let defaults = settings.default_column_refs();
    let columns = columns.unwrap_or(defaults.as_slice());

    cache.load(source.as_ref(), start, stop, columns, settings.reload_latest)
}
