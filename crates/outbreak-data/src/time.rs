//! Time keys and split boundaries.
//!
//! Time keys are either integer periods (typically a year) or calendar dates.
//! Internally both are compared through their physical `i64` value: the
//! integer itself, or days since the Unix epoch for dates.

use crate::error::{DataError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Representation of the time key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeKind {
    /// Integer period (year, epi-week index, ...)
    Integer,
    /// Calendar date
    Date,
}

impl TimeKind {
    /// Coarse period of a physical time key used for per-slice reporting.
    ///
    /// Integer keys are their own period; dates collapse to their year.
    pub fn period(&self, key: i64) -> i64 {
        match self {
            Self::Integer => key,
            Self::Date => i64::from(days_to_date(key).year()),
        }
    }

    /// Boundary naming exactly the given physical key.
    pub fn boundary(&self, key: i64) -> TimeBoundary {
        match self {
            Self::Integer => TimeBoundary::Integer(key),
            Self::Date => TimeBoundary::Date(days_to_date(key)),
        }
    }

    /// Human readable rendering of a physical time key.
    pub fn format(&self, key: i64) -> String {
        match self {
            Self::Integer => key.to_string(),
            Self::Date => days_to_date(key).to_string(),
        }
    }
}

// NaiveDate::default() is 1970-01-01.
fn days_to_date(days: i64) -> NaiveDate {
    NaiveDate::default() + chrono::Duration::days(days)
}

fn date_to_days(date: NaiveDate) -> i64 {
    (date - NaiveDate::default()).num_days()
}

/// Cut-off used by the temporal splitter.
///
/// Deserializes from either a JSON integer or an ISO `YYYY-MM-DD` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBoundary {
    /// Integer period boundary
    Integer(i64),
    /// Calendar date boundary
    Date(NaiveDate),
}

impl TimeBoundary {
    /// Resolve the boundary to a physical key for a frame of the given kind.
    ///
    /// An integer boundary against a date column is read as a year and
    /// resolves to December 31st of that year.
    pub fn to_physical(&self, kind: TimeKind) -> Result<i64> {
        match (self, kind) {
            (Self::Integer(value), TimeKind::Integer) => Ok(*value),
            (Self::Date(date), TimeKind::Date) => Ok(date_to_days(*date)),
            (Self::Integer(year), TimeKind::Date) => {
                let year = i32::try_from(*year).map_err(|_| {
                    DataError::InvalidBoundary(format!("year {year} out of range"))
                })?;
                NaiveDate::from_ymd_opt(year, 12, 31)
                    .map(date_to_days)
                    .ok_or_else(|| DataError::InvalidBoundary(format!("year {year} out of range")))
            }
            (Self::Date(date), TimeKind::Integer) => Err(DataError::InvalidBoundary(format!(
                "date boundary {date} cannot be applied to an integer time column"
            ))),
        }
    }

    /// Resolve the boundary as the inclusive start of a range.
    ///
    /// Same as [`Self::to_physical`] except that a year against a date column
    /// resolves to January 1st.
    pub fn to_physical_start(&self, kind: TimeKind) -> Result<i64> {
        match (self, kind) {
            (Self::Integer(year), TimeKind::Date) => i32::try_from(*year)
                .ok()
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
                .map(date_to_days)
                .ok_or_else(|| DataError::InvalidBoundary(format!("year {year} out of range"))),
            _ => self.to_physical(kind),
        }
    }
}

impl fmt::Display for TimeBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Date(date) => write!(f, "{date}"),
        }
    }
}

impl FromStr for TimeBoundary {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(value) = s.parse::<i64>() {
            return Ok(Self::Integer(value));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self::Date)
            .map_err(|_| DataError::InvalidBoundary(format!("cannot parse '{s}'")))
    }
}
