//! Second-resolution timestamps.
//!
//! Timestamps are plain UTC epoch seconds. They appear verbatim in segment
//! file names and in the `ts` column of every cached row, so the integer
//! representation is the canonical one; chrono is only used at the edges
//! for parsing and display.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string cannot be interpreted as a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp '{input}': expected epoch seconds, YYYY-MM-DD, YYYY-MM-DD HH:MM[:SS] or RFC 3339")]
pub struct TimestampParseError {
    /// The rejected input.
    pub input: String,
}

/// A point in time, in whole seconds since the Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from epoch seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Epoch seconds.
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    /// Create a timestamp from a UTC datetime, dropping sub-second precision.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    /// Convert to a UTC datetime. `None` when outside chrono's range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// `self + secs`, or `None` on overflow.
    pub fn checked_add(self, secs: i64) -> Option<Self> {
        self.0.checked_add(secs).map(Self)
    }

    /// Signed distance `self - earlier` in seconds, or `None` on overflow.
    pub fn checked_distance(self, earlier: Timestamp) -> Option<i64> {
        self.0.checked_sub(earlier.0)
    }

    /// Round down to the nearest multiple of `span` seconds.
    ///
    /// Non-positive spans leave the timestamp unchanged.
    pub fn block_floor(self, span: i64) -> Self {
        if span <= 0 {
            return self;
        }
        Self(self.0 - self.0.rem_euclid(span))
    }

    /// Parse a timestamp from a human or machine representation.
    ///
    /// Accepted forms:
    /// - epoch seconds (`1577836800`)
    /// - a date (`2020-01-01`), meaning midnight UTC
    /// - a naive datetime (`2020-01-01 12:00`, `2020-01-01T12:00:00`), read as UTC
    /// - RFC 3339 with an explicit offset (`2020-01-01T12:00:00+02:00`)
    pub fn parse(input: &str) -> Result<Self, TimestampParseError> {
        let s = input.trim();
        let err = || TimestampParseError {
            input: input.to_string(),
        };

        if s.is_empty() {
            return Err(err());
        }

        if let Ok(secs) = s.parse::<i64>() {
            return Ok(Self(secs));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_datetime(dt.with_timezone(&Utc)));
        }

        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self::from_datetime(Utc.from_utc_datetime(&naive)));
            }
        }

        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| err())?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(err)?;
        Ok(Self::from_datetime(Utc.from_utc_datetime(&midnight)))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl Sub for Timestamp {
    type Output = i64;

    /// Signed distance in seconds, saturating at the `i64` bounds.
    fn sub(self, rhs: Timestamp) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;

    fn add(self, secs: i64) -> Timestamp {
        Timestamp(self.0.saturating_add(secs))
    }
}

impl Sub<i64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, secs: i64) -> Timestamp {
        Timestamp(self.0.saturating_sub(secs))
    }
}
