use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::visited_in_year;
use crate::trip::Trip;

pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_HIGHLIGHT_DELAY: Duration = Duration::from_millis(1200);

/// Auto-play speed multiplier. Serialized as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PlaybackSpeed {
    #[default]
    X1,
    X2,
    X4,
}

impl PlaybackSpeed {
    pub fn factor(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::X1 => Self::X2,
            Self::X2 => Self::X4,
            Self::X4 => Self::X1,
        }
    }
}

impl From<PlaybackSpeed> for u32 {
    fn from(speed: PlaybackSpeed) -> Self {
        speed.factor()
    }
}

impl TryFrom<u32> for PlaybackSpeed {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::X1),
            2 => Ok(Self::X2),
            4 => Ok(Self::X4),
            other => Err(format!("unsupported playback speed {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// A change of the selected year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearChange {
    /// `None` on a first selection.
    pub from: Option<i32>,
    pub to: i32,
    pub direction: Option<Direction>,
}

/// Countries to pulse after a year change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub year: i32,
    pub countries: Vec<String>,
    pub direction: Option<Direction>,
}

pub fn highlight_for(
    change: &YearChange,
    trips: &[Trip],
    home_country: Option<&str>,
) -> Highlight {
    Highlight {
        year: change.to,
        countries: visited_in_year(trips, change.to, home_country),
        direction: change.direction,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSnapshot {
    pub enabled: bool,
    pub selected_year: i32,
    pub years: Vec<i32>,
    pub playing: bool,
    pub speed: PlaybackSpeed,
}

/// Year cursor over the years present in the trip history.
///
/// Every navigation method returns the resulting [`YearChange`], or `None`
/// when the selected year did not move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    years: Vec<i32>,
    index: usize,
    playing: bool,
    speed: PlaybackSpeed,
    enabled: bool,
}

fn normalize_years(mut years: Vec<i32>, fallback_year: i32) -> Vec<i32> {
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        years.push(fallback_year);
    }
    years
}

impl Timeline {
    /// Starts on the most recent year, disabled and paused.
    pub fn new(years: Vec<i32>, fallback_year: i32) -> Self {
        let years = normalize_years(years, fallback_year);
        let index = years.len() - 1;
        Self {
            years,
            index,
            playing: false,
            speed: PlaybackSpeed::default(),
            enabled: false,
        }
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn selected_year(&self) -> i32 {
        self.years[self.index]
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    fn last_index(&self) -> usize {
        self.years.len() - 1
    }

    fn at_last(&self) -> bool {
        self.index == self.last_index()
    }

    fn move_to(&mut self, index: usize) -> Option<YearChange> {
        if index == self.index {
            return None;
        }
        let from = self.selected_year();
        self.index = index;
        let to = self.selected_year();
        let direction = self.enabled.then(|| {
            if to > from {
                Direction::Asc
            } else {
                Direction::Desc
            }
        });
        Some(YearChange {
            from: Some(from),
            to,
            direction,
        })
    }

    pub fn first(&mut self) -> Option<YearChange> {
        self.move_to(0)
    }

    pub fn last(&mut self) -> Option<YearChange> {
        self.move_to(self.last_index())
    }

    pub fn prev(&mut self) -> Option<YearChange> {
        self.move_to(self.index.saturating_sub(1))
    }

    /// At the last year this only stops playback.
    pub fn next(&mut self) -> Option<YearChange> {
        if self.at_last() {
            self.playing = false;
            return None;
        }
        self.move_to(self.index + 1)
    }

    /// Jump to `year` when it is one of the timeline's years.
    pub fn select(&mut self, year: i32) -> Option<YearChange> {
        let index = self.years.binary_search(&year).ok()?;
        self.move_to(index)
    }

    /// One auto-play step. Landing on the last year ends playback.
    pub fn tick(&mut self) -> Option<YearChange> {
        if !self.playing {
            return None;
        }
        let change = self.next();
        if self.at_last() {
            self.playing = false;
        }
        change
    }

    /// Start playback. From the last year playback restarts at the first.
    pub fn play(&mut self) -> Option<YearChange> {
        if self.years.len() < 2 {
            return None;
        }
        let change = if self.at_last() { self.first() } else { None };
        self.playing = true;
        change
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle(&mut self) -> Option<YearChange> {
        if self.playing {
            self.pause();
            None
        } else {
            self.play()
        }
    }

    pub fn cycle_speed(&mut self) -> PlaybackSpeed {
        self.speed = self.speed.next();
        self.speed
    }

    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
    }

    /// Auto-play period at the current speed.
    pub fn interval(&self, base: Duration) -> Duration {
        base / self.speed.factor()
    }

    /// Replace the year list, keeping the selection when the year survives.
    pub fn set_years(&mut self, years: Vec<i32>, fallback_year: i32) {
        let selected = self.selected_year();
        self.years = normalize_years(years, fallback_year);
        self.index = self
            .years
            .binary_search(&selected)
            .unwrap_or(self.years.len() - 1);
        if self.years.len() < 2 {
            self.playing = false;
        }
    }

    /// Turn timeline mode on. Counts as a first selection of the current year.
    pub fn enable(&mut self) -> YearChange {
        self.enabled = true;
        YearChange {
            from: None,
            to: self.selected_year(),
            direction: None,
        }
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.playing = false;
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            enabled: self.enabled,
            selected_year: self.selected_year(),
            years: self.years.clone(),
            playing: self.playing,
            speed: self.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Direction, PlaybackSpeed, Timeline, YearChange, highlight_for};
    use crate::trip::Trip;

    fn timeline() -> Timeline {
        Timeline::new(vec![2023, 2019, 2021, 2021], 2030)
    }

    #[test]
    fn new_sorts_dedupes_and_starts_at_latest_year() {
        let timeline = timeline();
        assert_eq!(timeline.years(), &[2019, 2021, 2023]);
        assert_eq!(timeline.selected_year(), 2023);
        assert!(!timeline.is_playing());
        assert!(!timeline.is_enabled());
    }

    #[test]
    fn empty_years_fall_back_to_caller_year() {
        let timeline = Timeline::new(Vec::new(), 2026);
        assert_eq!(timeline.years(), &[2026]);
        assert_eq!(timeline.selected_year(), 2026);
    }

    #[test]
    fn prev_at_first_year_is_a_no_op() {
        let mut timeline = timeline();
        timeline.first();
        assert_eq!(timeline.prev(), None);
        assert_eq!(timeline.selected_year(), 2019);
    }

    #[test]
    fn next_at_last_year_stops_playback() {
        let mut timeline = timeline();
        timeline.first();
        timeline.play();
        timeline.last();
        assert!(timeline.is_playing());
        assert_eq!(timeline.next(), None);
        assert!(!timeline.is_playing());
        assert_eq!(timeline.selected_year(), 2023);
    }

    #[test]
    fn direction_only_reported_in_timeline_mode() {
        let mut timeline = timeline();
        let change = timeline.first().expect("moved");
        assert_eq!(change.direction, None);

        let enabled = timeline.enable();
        assert_eq!(
            enabled,
            YearChange {
                from: None,
                to: 2019,
                direction: None
            }
        );

        let forward = timeline.next().expect("moved");
        assert_eq!(forward.from, Some(2019));
        assert_eq!(forward.direction, Some(Direction::Asc));
        let back = timeline.prev().expect("moved");
        assert_eq!(back.direction, Some(Direction::Desc));
    }

    #[test]
    fn autoplay_stops_when_landing_on_last_year() {
        let mut timeline = timeline();
        timeline.first();
        timeline.play();

        assert_eq!(timeline.tick().map(|c| c.to), Some(2021));
        assert!(timeline.is_playing());
        assert_eq!(timeline.tick().map(|c| c.to), Some(2023));
        assert!(!timeline.is_playing());
        assert_eq!(timeline.tick(), None);
    }

    #[test]
    fn play_from_last_year_restarts_at_first() {
        let mut timeline = timeline();
        let change = timeline.play().expect("rewound");
        assert_eq!(change.to, 2019);
        assert!(timeline.is_playing());

        assert_eq!(timeline.toggle(), None);
        assert!(!timeline.is_playing());
    }

    #[test]
    fn single_year_never_plays() {
        let mut timeline = Timeline::new(vec![2020], 2026);
        assert_eq!(timeline.play(), None);
        assert!(!timeline.is_playing());
    }

    #[test]
    fn speed_cycles_and_divides_interval() {
        let mut timeline = timeline();
        let base = Duration::from_millis(1500);
        assert_eq!(timeline.interval(base), Duration::from_millis(1500));
        assert_eq!(timeline.cycle_speed(), PlaybackSpeed::X2);
        assert_eq!(timeline.interval(base), Duration::from_millis(750));
        assert_eq!(timeline.cycle_speed(), PlaybackSpeed::X4);
        assert_eq!(timeline.interval(base), Duration::from_millis(375));
        assert_eq!(timeline.cycle_speed(), PlaybackSpeed::X1);
    }

    #[test]
    fn speed_serializes_as_number() {
        assert_eq!(
            serde_json::to_value(PlaybackSpeed::X4).expect("serialize"),
            serde_json::json!(4)
        );
        assert!(serde_json::from_value::<PlaybackSpeed>(serde_json::json!(3)).is_err());
    }

    #[test]
    fn select_ignores_unknown_years_and_set_years_keeps_selection() {
        let mut timeline = timeline();
        assert_eq!(timeline.select(2020), None);
        assert_eq!(timeline.select(2021).map(|c| c.to), Some(2021));

        timeline.set_years(vec![2021, 2024], 2030);
        assert_eq!(timeline.selected_year(), 2021);
        timeline.set_years(vec![2018, 2019], 2030);
        assert_eq!(timeline.selected_year(), 2019);
    }

    #[test]
    fn disable_stops_playback() {
        let mut timeline = timeline();
        timeline.enable();
        timeline.first();
        timeline.play();
        timeline.disable();
        assert!(!timeline.is_playing());
        assert!(!timeline.is_enabled());
        assert_eq!(timeline.snapshot().selected_year, 2019);
    }

    #[test]
    fn highlight_lists_countries_of_new_year() {
        let mut trip = Trip::new("t", "Kyoto");
        trip.country_codes = vec!["JP".to_string()];
        trip.start_date = Some("2021-04-01".to_string());
        trip.end_date = Some("2021-04-09".to_string());

        let mut timeline = timeline();
        timeline.enable();
        let change = timeline.prev().expect("moved");
        let highlight = highlight_for(&change, &[trip], None);
        assert_eq!(highlight.year, 2021);
        assert_eq!(highlight.countries, vec!["JP".to_string()]);
        assert_eq!(highlight.direction, Some(Direction::Desc));
    }
}
