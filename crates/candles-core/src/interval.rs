//! Candle intervals.
//!
//! An interval is a fixed number of seconds with a short textual slug
//! (`15m`, `1h`, `1d`, `1w`). The slug is part of every source partition
//! name, so `from_slug(slug()).slug()` must be stable.

use std::fmt;
use std::ops::Mul;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::Timestamp;

/// Units accepted in slugs, largest first.
const UNITS: &[(char, i64)] = &[('w', 604_800), ('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)];

/// Errors from interval parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalParseError {
    #[error("invalid interval slug '{0}': expected <count><unit> with unit one of s, m, h, d, w")]
    InvalidSlug(String),

    #[error("interval must be positive, got '{0}'")]
    NotPositive(String),
}

/// A fixed candle duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    seconds: i64,
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]+)([smhdw])$").expect("static pattern"))
}

impl Interval {
    /// Create an interval of `seconds`. Returns `None` for non-positive values.
    pub fn from_secs(seconds: i64) -> Option<Self> {
        (seconds > 0).then_some(Self { seconds })
    }

    pub fn minutes(n: i64) -> Option<Self> {
        Self::from_secs(n.checked_mul(60)?)
    }

    pub fn hours(n: i64) -> Option<Self> {
        Self::from_secs(n.checked_mul(3_600)?)
    }

    pub fn days(n: i64) -> Option<Self> {
        Self::from_secs(n.checked_mul(86_400)?)
    }

    /// Length in seconds.
    pub const fn as_secs(&self) -> i64 {
        self.seconds
    }

    /// Parse a slug such as `1h` or `15m`.
    pub fn from_slug(slug: &str) -> Result<Self, IntervalParseError> {
        let caps = slug_pattern()
            .captures(slug)
            .ok_or_else(|| IntervalParseError::InvalidSlug(slug.to_string()))?;

        let count: i64 = caps[1]
            .parse()
            .map_err(|_| IntervalParseError::InvalidSlug(slug.to_string()))?;
        let unit = caps[2].chars().next().unwrap_or('s');
        let unit_secs = UNITS
            .iter()
            .find(|(c, _)| *c == unit)
            .map(|(_, secs)| *secs)
            .ok_or_else(|| IntervalParseError::InvalidSlug(slug.to_string()))?;

        let seconds = count
            .checked_mul(unit_secs)
            .ok_or_else(|| IntervalParseError::InvalidSlug(slug.to_string()))?;
        Self::from_secs(seconds).ok_or_else(|| IntervalParseError::NotPositive(slug.to_string()))
    }

    /// Canonical slug, using the largest unit that divides the length evenly.
    pub fn slug(&self) -> String {
        for (unit, secs) in UNITS {
            if self.seconds % secs == 0 {
                return format!("{}{}", self.seconds / secs, unit);
            }
        }
        format!("{}s", self.seconds)
    }

    /// Round `ts` down to a boundary of `steps` whole intervals.
    ///
    /// Paginated sources use this to anchor a page of `steps` candles so that
    /// every probe inside the same block requests the same page.
    pub fn align(&self, ts: Timestamp, steps: i64) -> Timestamp {
        ts.block_floor(self.seconds.saturating_mul(steps.max(1)))
    }
}

impl Mul<i64> for Interval {
    type Output = i64;

    /// Total seconds covered by `rhs` intervals, saturating at the `i64` bounds.
    fn mul(self, rhs: i64) -> i64 {
        self.seconds.saturating_mul(rhs)
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slug(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.slug())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_slug(&s).map_err(serde::de::Error::custom)
    }
}
