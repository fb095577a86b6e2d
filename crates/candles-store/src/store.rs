//! Filesystem-backed segment store for one source partition.
//!
//! Lookups scan the partition directory on every call; there is no index
//! file to keep consistent. Writes go through a temp file named after the
//! probe and are published with a single rename, so a crash mid-fetch can
//! only ever leave a temp file behind, never a truncated segment.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use candles_core::{PageBounds, Timestamp};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::segment::{Segment, SegmentBounds, SEGMENT_EXTENSION};

/// Errors from segment store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid partition slug '{0}'")]
    InvalidSlug(String),

    #[error("invalid page bounds: first {} is after last {}", .first.as_secs(), .last.as_secs())]
    InvalidBounds { first: Timestamp, last: Timestamp },

    #[error("failed to publish {} as {}: {source}", .temp.display(), .target.display())]
    Commit {
        temp: PathBuf,
        target: PathBuf,
        source: io::Error,
    },

    #[error("failed to scan cache root: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Segment store for one `(cache_root, slug)` partition.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    /// Partition slug, possibly nested (`source/instrument_interval`).
    slug: String,
    /// `<cache_root>/<slug>`.
    dir: PathBuf,
}

impl SegmentStore {
    /// Open the partition `slug` under `cache_root`.
    ///
    /// Does not touch the filesystem; the partition directory is created
    /// lazily on the first fetch. Slugs must be relative paths without
    /// `.`/`..` components so a partition can never escape the cache root.
    pub fn new(cache_root: impl AsRef<Path>, slug: &str) -> StoreResult<Self> {
        let relative = Path::new(slug);
        let valid = !slug.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidSlug(slug.to_string()));
        }

        Ok(Self {
            slug: slug.to_string(),
            dir: cache_root.as_ref().join(relative),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Partition directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical path for a segment with the given bounds.
    pub fn segment_path(&self, bounds: SegmentBounds) -> PathBuf {
        self.dir.join(bounds.file_name())
    }

    /// Path a fetch for `probe` writes to before being committed.
    ///
    /// Creates the partition directory if needed.
    pub fn temp_path(&self, probe: Timestamp) -> StoreResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        Ok(self
            .dir
            .join(format!("{}.{}", probe.as_secs(), SEGMENT_EXTENSION)))
    }

    /// Find a segment that can serve `probe`.
    ///
    /// Complete segments match when `first <= probe <= last`. Open segments
    /// match when `first <= probe`, unless `full_only` is set. Files whose
    /// names do not decode as segments are ignored. When several segments
    /// match, any one of them may be returned.
    pub fn find_containing(
        &self,
        probe: Timestamp,
        full_only: bool,
    ) -> StoreResult<Option<Segment>> {
        for segment in self.scan()? {
            if segment.bounds.contains(probe, full_only) {
                debug!(
                    slug = %self.slug,
                    probe = probe.as_secs(),
                    segment = %segment.bounds.file_name(),
                    "cache hit"
                );
                return Ok(Some(segment));
            }
        }

        debug!(slug = %self.slug, probe = probe.as_secs(), full_only, "cache miss");
        Ok(None)
    }

    /// Publish a fetched page.
    ///
    /// Renames `temp` to the canonical name for `bounds`. If the rename
    /// fails, `temp` is removed and the error returned. When `bounds` is
    /// complete and `full_only` is set, an open segment starting at the same
    /// timestamp is deleted: the complete page supersedes it.
    pub fn commit(
        &self,
        bounds: SegmentBounds,
        temp: &Path,
        full_only: bool,
    ) -> StoreResult<Segment> {
        let target = self.segment_path(bounds);

        if let Err(source) = fs::rename(temp, &target) {
            self.discard(temp);
            return Err(StoreError::Commit {
                temp: temp.to_path_buf(),
                target,
                source,
            });
        }

        if let SegmentBounds::Complete { first, .. } = bounds {
            if full_only {
                self.remove_superseded_open(first)?;
            }
        }

        Ok(Segment::new(bounds, target))
    }

    /// Bounds for a fetched page, validated.
    pub fn bounds_for_page(page: &PageBounds) -> StoreResult<SegmentBounds> {
        if page.completed {
            SegmentBounds::complete(page.first, page.last).ok_or(StoreError::InvalidBounds {
                first: page.first,
                last: page.last,
            })
        } else {
            Ok(SegmentBounds::open(page.first))
        }
    }

    /// Remove a temp artifact, ignoring a missing file.
    pub fn discard(&self, temp: &Path) {
        match fs::remove_file(temp) {
            Ok(()) => debug!(path = %temp.display(), "removed temp artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %temp.display(), error = %e, "failed to remove temp artifact"),
        }
    }

    /// All segments in the partition, ordered by first timestamp with
    /// complete segments before an open one starting at the same time.
    pub fn list(&self) -> StoreResult<Vec<Segment>> {
        let mut segments = self.scan()?;
        segments.sort_by_key(|s| (s.first(), s.is_open(), s.last()));
        Ok(segments)
    }

    /// Slugs of every partition under `cache_root` holding at least one
    /// segment, sorted.
    pub fn partitions(cache_root: impl AsRef<Path>) -> StoreResult<Vec<String>> {
        let root = cache_root.as_ref();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut slugs = BTreeSet::new();
        for entry in WalkDir::new(root).min_depth(2) {
            let entry = entry?;
            if !entry.file_type().is_file() || Segment::from_path(entry.path()).is_none() {
                continue;
            }

            let Some(parent) = entry.path().parent() else {
                continue;
            };
            let Ok(relative) = parent.strip_prefix(root) else {
                continue;
            };

            let slug = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            slugs.insert(slug);
        }

        Ok(slugs.into_iter().collect())
    }

    /// Decode every segment file in the partition directory.
    fn scan(&self) -> StoreResult<Vec<Segment>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut segments = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match Segment::from_path(&path) {
                Some(segment) => segments.push(segment),
                None => trace!(path = %path.display(), "skipping non-segment file"),
            }
        }

        Ok(segments)
    }

    fn remove_superseded_open(&self, first: Timestamp) -> StoreResult<()> {
        let open = self.segment_path(SegmentBounds::open(first));
        match fs::remove_file(&open) {
            Ok(()) => {
                info!(slug = %self.slug, path = %open.display(), "removed superseded open segment");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
