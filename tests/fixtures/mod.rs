//! Shared helpers for cache integration tests
//!
//! Provides in-process sources with scripted behavior and helpers for
//! pre-populating a cache root with segment files.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use local_candles::{PageBounds, Source, SourceError, Timestamp};

pub const OHLC: &[&str] = &["open", "high", "low", "close"];
pub const OHLCV: &[&str] = &["open", "high", "low", "close", "volume"];

pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_secs(secs)
}

/// `ts,open,high,low,close,volume` row whose values are derived from `ts`.
pub fn candle_row(secs: i64) -> String {
    let base = secs as f64 / 3600.0;
    format!(
        "{},{},{},{},{},{}",
        secs,
        base,
        base + 1.0,
        base - 1.0,
        base + 0.5,
        10.0
    )
}

/// CSV document with the standard header and one row per timestamp.
pub fn candle_csv(timestamps: &[i64]) -> String {
    let mut out = String::from("ts,open,high,low,close,volume\n");
    for secs in timestamps {
        out.push_str(&candle_row(*secs));
        out.push('\n');
    }
    out
}

/// Write a segment file named `name` into the `slug` partition.
pub fn write_segment(root: &Path, slug: &str, name: &str, contents: &str) -> PathBuf {
    let dir = root.join(slug);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Sorted file names in the `slug` partition.
pub fn partition_files(root: &Path, slug: &str) -> Vec<String> {
    let dir = root.join(slug);
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Fixed-page source
// =============================================================================

/// Writes the same CSV and returns the same bounds for every probe.
pub struct StubSource {
    pub slug: String,
    pub contents: String,
    pub bounds: PageBounds,
    pub calls: RefCell<Vec<Timestamp>>,
}

impl StubSource {
    pub fn new(slug: &str, contents: String, first: i64, last: i64, completed: bool) -> Self {
        Self {
            slug: slug.to_string(),
            contents,
            bounds: PageBounds::new(ts(first), ts(last), completed),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Source for StubSource {
    fn slug(&self) -> String {
        self.slug.clone()
    }

    fn columns(&self) -> &[&str] {
        OHLCV
    }

    fn fetch_page(&self, probe: Timestamp, dest: &Path) -> Result<PageBounds, SourceError> {
        self.calls.borrow_mut().push(probe);
        fs::write(dest, &self.contents)?;
        Ok(self.bounds)
    }
}

// =============================================================================
// Failing source
// =============================================================================

/// Fails every call, optionally after writing part of a page.
pub struct FailingSource {
    pub slug: String,
    pub write_partial: bool,
    pub calls: RefCell<Vec<Timestamp>>,
}

impl FailingSource {
    pub fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            write_partial: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_partial_write(mut self) -> Self {
        self.write_partial = true;
        self
    }
}

impl Source for FailingSource {
    fn slug(&self) -> String {
        self.slug.clone()
    }

    fn columns(&self) -> &[&str] {
        OHLCV
    }

    fn fetch_page(&self, probe: Timestamp, dest: &Path) -> Result<PageBounds, SourceError> {
        self.calls.borrow_mut().push(probe);
        if self.write_partial {
            let mut file = fs::File::create(dest)?;
            write!(file, "ts,open,high")?;
        }
        Err(SourceError::Request(format!(
            "connection refused at probe {}",
            probe.as_secs()
        )))
    }
}

// =============================================================================
// Silent source
// =============================================================================

/// Reports a page without writing anything to `dest`.
pub struct SilentSource {
    pub slug: String,
}

impl Source for SilentSource {
    fn slug(&self) -> String {
        self.slug.clone()
    }

    fn columns(&self) -> &[&str] {
        OHLCV
    }

    fn fetch_page(&self, probe: Timestamp, _dest: &Path) -> Result<PageBounds, SourceError> {
        Ok(PageBounds::new(probe, probe + 3600, true))
    }
}

// =============================================================================
// Paged source
// =============================================================================

/// Serves hourly candles in fixed blocks of `limit` rows, up to a movable
/// frontier.
///
/// A probe maps to the block of `limit * step` seconds containing it, the
/// way exchange kline endpoints are paged. Rows past `frontier` do not exist
/// yet; a block cut short by the frontier is reported as not completed.
pub struct PagedSource {
    pub slug: String,
    pub step: i64,
    pub limit: i64,
    pub frontier: Cell<i64>,
    pub calls: RefCell<Vec<Timestamp>>,
}

impl PagedSource {
    pub fn new(slug: &str, frontier: i64) -> Self {
        Self {
            slug: slug.to_string(),
            step: 3600,
            limit: 5,
            frontier: Cell::new(frontier),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn advance_to(&self, frontier: i64) {
        self.frontier.set(frontier);
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl Source for PagedSource {
    fn slug(&self) -> String {
        self.slug.clone()
    }

    fn columns(&self) -> &[&str] {
        OHLCV
    }

    fn fetch_page(&self, probe: Timestamp, dest: &Path) -> Result<PageBounds, SourceError> {
        self.calls.borrow_mut().push(probe);

        let start = probe.block_floor(self.step * self.limit).as_secs();
        let rows: Vec<i64> = (0..self.limit)
            .map(|i| start + i * self.step)
            .take_while(|secs| *secs <= self.frontier.get())
            .collect();

        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(SourceError::EmptyPage { probe });
        };

        fs::write(dest, candle_csv(&rows))?;
        Ok(PageBounds::new(
            ts(*first),
            ts(*last),
            rows.len() as i64 == self.limit,
        ))
    }
}
