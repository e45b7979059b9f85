//! Partial dates as they appear in biographical sources.
//!
//! Sources rarely give full dates for early-life events, so a record date is
//! either a bare year (`YYYY`) or a calendar day (`YYYY-MM-DD`). Comparisons
//! between the two granularities happen at the coarser one.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Error returned when a date string is not `YYYY` or a real `YYYY-MM-DD` day.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateFormatError {
    /// The string matches neither accepted shape.
    #[error("Date must be in YYYY or YYYY-MM-DD format, got: {0}")]
    Malformed(String),
    /// The string has the `YYYY-MM-DD` shape but names a day that does not exist.
    #[error("Invalid date: {0}")]
    InvalidCalendarDate(String),
}

/// A date known either to the year or to the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartialDate {
    /// Only the year is known.
    Year(i32),
    /// The full calendar day is known.
    Day(NaiveDate),
}

impl PartialDate {
    /// Parses `YYYY` or `YYYY-MM-DD`.
    ///
    /// # Errors
    ///
    /// Returns [`DateFormatError`] for any other shape or for impossible days
    /// such as `1961-02-30`.
    pub fn parse(raw: &str) -> Result<Self, DateFormatError> {
        let bytes = raw.as_bytes();
        let all_digits =
            |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

        if bytes.len() == 4 && all_digits(0..4) {
            let year = raw
                .parse::<i32>()
                .map_err(|_| DateFormatError::Malformed(raw.to_string()))?;
            return Ok(Self::Year(year));
        }

        if bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && all_digits(0..4)
            && all_digits(5..7)
            && all_digits(8..10)
        {
            return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Self::Day)
                .map_err(|_| DateFormatError::InvalidCalendarDate(raw.to_string()));
        }

        Err(DateFormatError::Malformed(raw.to_string()))
    }

    /// The year component.
    #[must_use]
    pub fn year(&self) -> i32 {
        match self {
            Self::Year(year) => *year,
            Self::Day(day) => day.year(),
        }
    }

    /// Compares two dates at the coarser of their granularities.
    ///
    /// `1995` and `1995-06-01` compare equal; two full days compare by day.
    #[must_use]
    pub fn cmp_coarse(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Day(a), Self::Day(b)) => a.cmp(b),
            _ => self.year().cmp(&other.year()),
        }
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year:04}"),
            Self::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
        }
    }
}
