use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::trip::{Trip, normalize_code, parse_date};

/// Label used for a visit whose trip has no start date yet.
pub const TBD_YEAR_RANGE: &str = "TBD";

/// One country's participation in one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub country_code: String,
    pub year_range: String,
    pub trip_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl Visit {
    fn from_trip(trip: &Trip, country_code: &str) -> Self {
        Self {
            country_code: country_code.to_owned(),
            year_range: year_range(trip.start(), trip.end()),
            trip_name: trip.name.clone(),
            start_date: trip.start_date.clone(),
            end_date: trip.end_date.clone(),
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start_date.as_deref().and_then(parse_date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitBuckets {
    pub past: Vec<Visit>,
    pub upcoming: Vec<Visit>,
    pub tentative: Vec<Visit>,
}

fn year_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    let Some(start) = start else {
        return TBD_YEAR_RANGE.to_owned();
    };
    let start_year = start.year();
    let end_year = end.map_or(start_year, |end| end.year());
    if start_year == end_year {
        start_year.to_string()
    } else {
        format!("{start_year} - {end_year}")
    }
}

/// Visits to `iso_code`, earliest start first. Trips without a start date go
/// last and keep their input order among themselves.
pub fn resolve_visits(trips: &[Trip], iso_code: &str) -> Vec<Visit> {
    let code = normalize_code(iso_code);
    let mut matching: Vec<(&Trip, Option<NaiveDate>)> = trips
        .iter()
        .filter(|trip| trip.touches(&code))
        .map(|trip| (trip, trip.start()))
        .collect();

    // sort_by is stable, which is what keeps undated trips in input order.
    matching.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    matching
        .into_iter()
        .map(|(trip, _)| Visit::from_trip(trip, &code))
        .collect()
}

/// Splits visits into exactly one bucket each. Tentative wins, then past;
/// everything still open (upcoming or in progress) is upcoming.
pub fn classify(visits: &[Visit], now: NaiveDate) -> VisitBuckets {
    let mut buckets = VisitBuckets::default();
    for visit in visits {
        let Some(start) = visit.start() else {
            buckets.tentative.push(visit.clone());
            continue;
        };
        let effective_end = visit.end().unwrap_or(start);
        if effective_end < now {
            buckets.past.push(visit.clone());
        } else {
            buckets.upcoming.push(visit.clone());
        }
    }
    buckets
}

/// Distinct end-date years, ascending. Empty when no trip has a valid end date.
pub fn years_with_trips(trips: &[Trip]) -> Vec<i32> {
    trips
        .iter()
        .filter_map(|trip| trip.end().map(|end| end.year()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
