//! Second-resolution timestamps.
//!
//! [`TimePointSec`] is the 32-bit seconds-since-epoch type used in
//! transaction headers. The textual form is `%Y-%m-%dT%H:%M:%S` (no zone
//! suffix, UTC implied); parsing additionally tolerates a fractional-seconds
//! tail, which some producers emit.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Error raised when parsing a timestamp string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp {0:?}")]
pub struct ParseTimeError(String);

/// Seconds since the Unix epoch, truncated to 32 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
pub struct TimePointSec(u32);

impl TimePointSec {
    /// The epoch itself, the value used in null transaction headers.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw seconds value.
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Returns the raw seconds value.
    #[must_use]
    pub const fn as_secs(&self) -> u32 {
        self.0
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(chrono::Utc::now().timestamp() as u32)
    }
}

impl Add<u32> for TimePointSec {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl From<u32> for TimePointSec {
    fn from(secs: u32) -> Self {
        Self(secs)
    }
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp(i64::from(self.0), 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            None => write!(f, "1970-01-01T00:00:00"),
        }
    }
}

impl FromStr for TimePointSec {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_end_matches('Z');
        let dt = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| ParseTimeError(s.into()))?;
        let secs = dt.and_utc().timestamp();
        u32::try_from(secs)
            .map(Self)
            .map_err(|_| ParseTimeError(s.into()))
    }
}
