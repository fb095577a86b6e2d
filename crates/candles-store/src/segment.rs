//! Segment bounds and their file name encoding.

use std::path::{Path, PathBuf};

use candles_core::Timestamp;

/// File extension of every segment and temp file.
pub const SEGMENT_EXTENSION: &str = "csv";

/// Time bounds of a cached segment.
///
/// The file name is a pure serialization of this value:
/// `Complete { first, last }` <-> `<first>_<last>.csv`,
/// `Open { first }` <-> `<first>_.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentBounds {
    /// A full page with a fixed upper bound. Immutable once written.
    Complete { first: Timestamp, last: Timestamp },
    /// The frontier page; its upper bound is unknown and it may still grow.
    Open { first: Timestamp },
}

impl SegmentBounds {
    /// Complete bounds, or `None` when `first > last`.
    pub fn complete(first: Timestamp, last: Timestamp) -> Option<Self> {
        (first <= last).then_some(Self::Complete { first, last })
    }

    pub fn open(first: Timestamp) -> Self {
        Self::Open { first }
    }

    pub fn first(&self) -> Timestamp {
        match *self {
            Self::Complete { first, .. } | Self::Open { first } => first,
        }
    }

    /// Upper bound, `None` for open segments.
    pub fn last(&self) -> Option<Timestamp> {
        match *self {
            Self::Complete { last, .. } => Some(last),
            Self::Open { .. } => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Whether a segment with these bounds can serve `probe`.
    ///
    /// Open segments never match when `full_only` is set.
    pub fn contains(&self, probe: Timestamp, full_only: bool) -> bool {
        match *self {
            Self::Complete { first, last } => first <= probe && probe <= last,
            Self::Open { first } => !full_only && first <= probe,
        }
    }

    /// Canonical file name.
    pub fn file_name(&self) -> String {
        match *self {
            Self::Complete { first, last } => {
                format!("{}_{}.{}", first.as_secs(), last.as_secs(), SEGMENT_EXTENSION)
            }
            Self::Open { first } => format!("{}_.{}", first.as_secs(), SEGMENT_EXTENSION),
        }
    }

    /// Decode a file name. Anything that is not a well-formed segment name
    /// (temp files, foreign files, inverted bounds) yields `None`.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
        let (first, last) = stem.split_once('_')?;
        let first = Timestamp::from_secs(first.parse().ok()?);

        if last.is_empty() {
            return Some(Self::Open { first });
        }

        let last = Timestamp::from_secs(last.parse().ok()?);
        Self::complete(first, last)
    }
}

/// A segment file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub bounds: SegmentBounds,
    pub path: PathBuf,
}

impl Segment {
    pub fn new(bounds: SegmentBounds, path: impl Into<PathBuf>) -> Self {
        Self {
            bounds,
            path: path.into(),
        }
    }

    /// Build a segment from a path whose file name encodes its bounds.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let bounds = SegmentBounds::parse_file_name(name)?;
        Some(Self::new(bounds, path))
    }

    pub fn first(&self) -> Timestamp {
        self.bounds.first()
    }

    pub fn last(&self) -> Option<Timestamp> {
        self.bounds.last()
    }

    pub fn is_open(&self) -> bool {
        self.bounds.is_open()
    }
}
