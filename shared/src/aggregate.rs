use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};

use crate::trip::{Trip, normalize_code};

/// Country code -> number of completed trips touching it.
pub type VisitCountMap = BTreeMap<String, u32>;

/// Insertion-ordered set of country codes.
#[derive(Default)]
struct CodeSet {
    seen: HashSet<String>,
    codes: Vec<String>,
}

impl CodeSet {
    fn insert(&mut self, raw: &str) {
        let code = normalize_code(raw);
        if code.is_empty() {
            return;
        }
        if self.seen.insert(code.clone()) {
            self.codes.push(code);
        }
    }

    fn extend_from_trip(&mut self, trip: &Trip) {
        for code in &trip.country_codes {
            self.insert(code);
        }
    }

    fn finish(mut self, home_country: Option<&str>) -> Vec<String> {
        if let Some(home) = home_country {
            self.insert(home);
        }
        self.codes
    }
}

fn trip_codes(trip: &Trip) -> impl Iterator<Item = String> + '_ {
    let mut seen = HashSet::new();
    trip.country_codes
        .iter()
        .map(|code| normalize_code(code))
        .filter(|code| !code.is_empty())
        .filter(move |code| seen.insert(code.clone()))
}

/// Countries with at least one trip whose end date has passed, plus home.
pub fn visited_as_of_now(
    trips: &[Trip],
    now: NaiveDate,
    home_country: Option<&str>,
) -> Vec<String> {
    let mut set = CodeSet::default();
    for trip in trips {
        if trip.end().is_some_and(|end| end <= now) {
            set.extend_from_trip(trip);
        }
    }
    set.finish(home_country)
}

/// Countries with a trip overlapping `year`. A trip with one valid date
/// counts in that date's year.
pub fn visited_in_year(trips: &[Trip], year: i32, home_country: Option<&str>) -> Vec<String> {
    let mut set = CodeSet::default();
    for trip in trips {
        let Some((start_year, end_year)) = trip.year_span() else {
            continue;
        };
        if start_year <= year && year <= end_year {
            set.extend_from_trip(trip);
        }
    }
    set.finish(home_country)
}

fn completed_by(trip: &Trip, year: i32, now: NaiveDate) -> bool {
    // Both conditions are required: a trip ending under the year cursor but
    // still in the future has not been visited yet.
    trip.end()
        .is_some_and(|end| end.year() <= year && end <= now)
}

/// Per-country count of trips that ended in or before `year` and have
/// actually ended by `now`. Home country gets one synthetic visit.
pub fn visit_counts_up_to_year(
    trips: &[Trip],
    year: i32,
    now: NaiveDate,
    home_country: Option<&str>,
) -> VisitCountMap {
    let mut counts = VisitCountMap::new();
    for trip in trips.iter().filter(|trip| completed_by(trip, year, now)) {
        for code in trip_codes(trip) {
            *counts.entry(code).or_insert(0) += 1;
        }
    }
    if let Some(home) = home_country {
        let home = normalize_code(home);
        if !home.is_empty() {
            *counts.entry(home).or_insert(0) += 1;
        }
    }
    counts
}

/// Cumulative visited set for a year cursor: same qualification as
/// [`visit_counts_up_to_year`], in trip order.
pub fn visited_up_to_year(
    trips: &[Trip],
    year: i32,
    now: NaiveDate,
    home_country: Option<&str>,
) -> Vec<String> {
    let mut set = CodeSet::default();
    for trip in trips.iter().filter(|trip| completed_by(trip, year, now)) {
        set.extend_from_trip(trip);
    }
    set.finish(home_country)
}

/// Earliest end year of a not-yet-started trip, per country. Countries
/// without an upcoming trip are absent.
pub fn next_upcoming_year(trips: &[Trip], now: NaiveDate) -> BTreeMap<String, i32> {
    let mut next = BTreeMap::new();
    for trip in trips {
        let Some((start, end)) = trip.span() else {
            continue;
        };
        if start <= now || end <= now {
            continue;
        }
        let end_year = end.year();
        for code in trip_codes(trip) {
            next.entry(code)
                .and_modify(|year: &mut i32| *year = (*year).min(end_year))
                .or_insert(end_year);
        }
    }
    next
}
