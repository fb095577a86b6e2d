//! Range resolution over the segment store.
//!
//! A load walks the requested range with a probe timestamp. Each step
//! either hits a cached segment containing the probe or fetches the page
//! around it from the source; the probe then moves past the segment just
//! collected. Collected segments are read back in order, deduplicated by
//! timestamp and clipped to `[start, stop)`.
//!
//! The next probe is placed half a page beyond the last segment
//! (`last + (last - first) / 2`), aiming at the middle of the expected next
//! page rather than at its boundary.

use std::fs;
use std::path::{Path, PathBuf};

use candles_core::{Source, Timestamp};
use candles_store::{Segment, SegmentStore};
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};
use crate::table::{CandleTable, TableBuilder};

/// Why the probe loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An open segment was hit; nothing newer exists.
    OpenSegment,
    /// The step produced the same first timestamp as the previous one.
    NoProgress,
    /// The source returned a short page: the frontier was reached.
    ShortPage,
    /// The last collected segment reaches the end of the range.
    Covered,
}

/// What a load did to resolve its range.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Segments read, in collection order.
    pub segments: Vec<Segment>,
    /// Number of `fetch_page` calls issued.
    pub fetched_pages: usize,
    pub stop_reason: StopReason,
}

/// File-backed incremental cache rooted at one directory.
///
/// Each source slug gets its own partition under the root. A `RangeCache`
/// holds no state besides the root path; concurrent loads against the same
/// partition must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct RangeCache {
    root: PathBuf,
}

impl RangeCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    ///
    /// The parent of `root` must already exist.
    pub fn new(root: impl AsRef<Path>) -> CacheResult<Self> {
        let root = root.as_ref().to_path_buf();

        if root.exists() {
            if !root.is_dir() {
                return Err(CacheError::InvalidCacheRoot {
                    path: root,
                    reason: "not a directory".to_string(),
                });
            }
        } else {
            let missing_parent = root
                .parent()
                .filter(|p| !p.as_os_str().is_empty() && !p.is_dir())
                .map(|p| format!("parent {} does not exist", p.display()));
            if let Some(reason) = missing_parent {
                return Err(CacheError::InvalidCacheRoot { path: root, reason });
            }
            fs::create_dir(&root)?;
            info!(root = %root.display(), "created cache root");
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Segment store for one source partition.
    pub fn store(&self, slug: &str) -> CacheResult<SegmentStore> {
        Ok(SegmentStore::new(&self.root, slug)?)
    }

    /// Load `[start, stop)` from `source`, projected onto `columns`.
    ///
    /// With `reload_latest`, open segments are never used as cache hits: the
    /// frontier page is always fetched again since it may have grown.
    ///
    /// The result may cover less than the requested range when the source
    /// stops making progress; that is not reported as an error.
    pub fn load<S: Source + ?Sized>(
        &self,
        source: &S,
        start: Timestamp,
        stop: Timestamp,
        columns: &[&str],
        reload_latest: bool,
    ) -> CacheResult<CandleTable> {
        self.load_with_report(source, start, stop, columns, reload_latest)
            .map(|(table, _)| table)
    }

    /// Same as [`RangeCache::load`], also returning what the load did.
    pub fn load_with_report<S: Source + ?Sized>(
        &self,
        source: &S,
        start: Timestamp,
        stop: Timestamp,
        columns: &[&str],
        reload_latest: bool,
    ) -> CacheResult<(CandleTable, LoadReport)> {
        let store = self.store(&source.slug())?;
        let report = self.collect(&store, source, start, stop, reload_latest)?;

        let mut builder = TableBuilder::new(columns, start, stop);
        for segment in &report.segments {
            builder.append_segment(&segment.path)?;
        }

        Ok((builder.finish(), report))
    }

    /// Run the probe loop and return the segments covering the range.
    fn collect<S: Source + ?Sized>(
        &self,
        store: &SegmentStore,
        source: &S,
        start: Timestamp,
        stop: Timestamp,
        reload_latest: bool,
    ) -> CacheResult<LoadReport> {
        let mut probe = start;
        let mut segments = Vec::new();
        let mut fetched_pages = 0;
        let mut previous_first: Option<Timestamp> = None;

        let stop_reason = loop {
            let (segment, completed) = match store.find_containing(probe, reload_latest)? {
                Some(segment) if segment.is_open() => {
                    segments.push(segment);
                    break StopReason::OpenSegment;
                }
                Some(segment) => (segment, true),
                None => {
                    fetched_pages += 1;
                    self.fetch(store, source, probe, reload_latest)?
                }
            };

            let first = segment.first();
            let last = segment.last();

            if previous_first == Some(first) {
                break StopReason::NoProgress;
            }
            previous_first = Some(first);
            segments.push(segment);

            if !completed {
                break StopReason::ShortPage;
            }
            let Some(last) = last else {
                break StopReason::ShortPage;
            };
            if last >= stop {
                break StopReason::Covered;
            }

            // Spans too wide to step over end the walk instead of wrapping
            let next = last
                .checked_distance(first)
                .and_then(|span| last.checked_add(span / 2));
            let Some(next) = next else {
                break StopReason::NoProgress;
            };
            probe = next;
            debug!(slug = store.slug(), probe = probe.as_secs(), "advancing probe");
        };

        info!(
            slug = store.slug(),
            start = start.as_secs(),
            stop = stop.as_secs(),
            segments = segments.len(),
            fetched_pages,
            ?stop_reason,
            "resolved range"
        );

        Ok(LoadReport {
            segments,
            fetched_pages,
            stop_reason,
        })
    }

    /// Fetch the page around `probe` and publish it.
    fn fetch<S: Source + ?Sized>(
        &self,
        store: &SegmentStore,
        source: &S,
        probe: Timestamp,
        full_only: bool,
    ) -> CacheResult<(Segment, bool)> {
        let temp = store.temp_path(probe)?;

        let page = match source.fetch_page(probe, &temp) {
            Ok(page) => page,
            Err(err) => {
                store.discard(&temp);
                return Err(CacheError::Fetch {
                    slug: store.slug().to_string(),
                    probe,
                    source: err,
                });
            }
        };

        let bounds = match SegmentStore::bounds_for_page(&page) {
            Ok(bounds) => bounds,
            Err(err) => {
                store.discard(&temp);
                return Err(err.into());
            }
        };

        let segment = store.commit(bounds, &temp, full_only)?;
        info!(
            slug = store.slug(),
            first = page.first.as_secs(),
            last = page.last.as_secs(),
            completed = page.completed,
            "loaded page from source"
        );

        Ok((segment, page.completed))
    }
}
