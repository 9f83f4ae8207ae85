//! Timestamp types for tracking events.
//!
//! This module provides [`EventTimestamp`] for representing when a tracking
//! event happened (a full local datetime, or a bare date when the carrier
//! reports no time of day), and helpers for resolving the timezone
//! abbreviations carrier feeds use instead of IANA identifiers.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// When a tracking event happened, as reported by the carrier.
///
/// Carriers are inconsistent: some report a full local date and time, some a
/// bare date. An event with no usable date at all is modelled as
/// `Option<EventTimestamp>` on the history entry, not as a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTimestamp {
    /// A specific local datetime with a UTC offset.
    DateTime(DateTime<FixedOffset>),
    /// A date with no time of day.
    Date(NaiveDate),
}

impl EventTimestamp {
    /// Creates a timestamp from a datetime with a known offset.
    pub fn from_datetime(dt: DateTime<FixedOffset>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a date-only timestamp.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::Date(date)
    }

    /// Combines a naive local wall-clock datetime with a UTC offset.
    pub fn from_local(naive: NaiveDateTime, offset: FixedOffset) -> Self {
        let utc = naive - offset;
        Self::DateTime(DateTime::from_naive_utc_and_offset(utc, offset))
    }

    /// Returns `true` if the carrier supplied only a date.
    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Returns the datetime if this is a `DateTime` variant.
    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::Date(_) => None,
        }
    }

    /// Returns the date portion of this timestamp.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.date_naive(),
            Self::Date(date) => *date,
        }
    }

    /// Converts to a UTC instant for comparison purposes.
    ///
    /// Date-only timestamps compare at midnight UTC on that date.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => dt.with_timezone(&Utc),
            Self::Date(date) => date.and_hms_opt(0, 0, 0).expect("valid time").and_utc(),
        }
    }
}

impl PartialOrd for EventTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc().cmp(&other.to_utc())
    }
}

/// Resolves a North-American timezone abbreviation to a fixed UTC offset.
///
/// Postal feeds report zones as abbreviations, which are globally ambiguous;
/// the table is scoped to the zones the supported carriers actually serve.
/// Unknown abbreviations resolve to `None` so the caller can fall back to the
/// last zone it saw.
pub fn offset_for_abbreviation(abbr: &str) -> Option<FixedOffset> {
    let seconds = match abbr {
        "NDT" => -(2 * 3600 + 1800),
        "NST" => -(3 * 3600 + 1800),
        "ADT" => -3 * 3600,
        "AST" | "EDT" => -4 * 3600,
        "EST" | "CDT" => -5 * 3600,
        "CST" | "MDT" => -6 * 3600,
        "MST" | "PDT" => -7 * 3600,
        "PST" | "AKDT" => -8 * 3600,
        "AKST" => -9 * 3600,
        "HST" => -10 * 3600,
        "GMT" | "UTC" | "Z" => 0,
        _ => return None,
    };
    FixedOffset::east_opt(seconds)
}

/// The UTC offset of the querying process's local timezone.
///
/// Used when a carrier reports wall-clock times with no zone at all.
pub fn local_offset() -> FixedOffset {
    *Local::now().offset()
}
