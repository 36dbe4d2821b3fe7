use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TripStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
}

/// A logged trip. Dates are kept exactly as the caller stored them; use
/// [`Trip::start`] / [`Trip::end`] to read them as calendar dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub status: TripStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Trip {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country_codes: Vec::new(),
            start_date: None,
            end_date: None,
            status: TripStatus::Planned,
            rating: None,
            favorite: None,
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start_date.as_deref().and_then(parse_date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_date)
    }

    /// Effective `(start, end)`. A trip with only one valid date is a one-day trip.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => Some((start, end)),
            (Some(day), None) | (None, Some(day)) => Some((day, day)),
            (None, None) => None,
        }
    }

    pub fn year_span(&self) -> Option<(i32, i32)> {
        self.span().map(|(start, end)| (start.year(), end.year()))
    }

    pub fn touches(&self, iso_code: &str) -> bool {
        self.country_codes
            .iter()
            .any(|code| code.trim().eq_ignore_ascii_case(iso_code.trim()))
    }

    /// Status computed from the date range. The stored status is only consulted
    /// when the trip has no usable dates.
    pub fn derived_status(&self, now: NaiveDate) -> TripStatus {
        derive_status(self.start(), self.end(), now, Some(self.status))
    }

    pub fn refresh_status(&mut self, now: NaiveDate) {
        self.status = self.derived_status(now);
    }

    /// Canonicalizes a trip on create/edit: upper-case unique country codes,
    /// rating clamped, status recomputed.
    pub fn normalize(&mut self, now: NaiveDate) {
        let mut seen = HashSet::new();
        self.country_codes = self
            .country_codes
            .iter()
            .map(|code| normalize_code(code))
            .filter(|code| !code.is_empty())
            .filter(|code| seen.insert(code.clone()))
            .collect();
        self.rating = self.rating.map(|rating| rating.min(MAX_RATING));
        self.refresh_status(now);
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Parses `YYYY-MM-DD` or an RFC 3339 timestamp (date part only).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

pub fn derive_status(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    now: NaiveDate,
    fallback: Option<TripStatus>,
) -> TripStatus {
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        (Some(day), None) | (None, Some(day)) => (day, day),
        (None, None) => return fallback.unwrap_or_default(),
    };

    if now < start {
        TripStatus::Planned
    } else if now <= end {
        TripStatus::InProgress
    } else {
        TripStatus::Completed
    }
}
