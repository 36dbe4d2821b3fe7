use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use passport_shared::{
    Highlight, Timeline, TimelineSnapshot, Trip, YearChange, highlight_for, years_with_trips,
};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

/// What subscribers see: the timeline state plus the pulse currently shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineFrame {
    #[serde(flatten)]
    pub timeline: TimelineSnapshot,
    pub highlight: Option<Highlight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineAction {
    First,
    Prev,
    Next,
    Last,
    Play,
    Pause,
    Toggle,
    Speed,
    Enable,
    Disable,
    Select(i32),
}

impl TimelineAction {
    /// Parse a route action name. `select` needs a year.
    pub fn parse(name: &str, year: Option<i32>) -> Option<Self> {
        let action = match name {
            "first" => Self::First,
            "prev" => Self::Prev,
            "next" => Self::Next,
            "last" => Self::Last,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "toggle" => Self::Toggle,
            "speed" => Self::Speed,
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            "select" => Self::Select(year?),
            _ => return None,
        };
        Some(action)
    }
}

struct PlayerState {
    timeline: Timeline,
    trips: Vec<Trip>,
    /// Set when an auto-play task is spawned, cleared by that task under this
    /// lock as it stops.
    autoplay_running: bool,
}

struct PlayerShared {
    state: Mutex<PlayerState>,
    home_country: Option<String>,
    frames: Arc<watch::Sender<TimelineFrame>>,
    highlights: StdMutex<JoinSet<()>>,
    base_interval: Duration,
    highlight_delay: Duration,
}

impl PlayerShared {
    /// Publish the state after an action. A year change gets a fresh
    /// highlight and its own clear timer.
    fn publish(&self, state: &PlayerState, change: Option<YearChange>) {
        let snapshot = state.timeline.snapshot();
        let home = self.home_country.as_deref();
        let highlight = change.map(|change| highlight_for(&change, &state.trips, home));
        let pulsed = highlight.is_some();
        self.frames.send_modify(|frame| {
            frame.timeline = snapshot;
            if highlight.is_some() {
                frame.highlight = highlight;
            }
        });
        if pulsed {
            self.schedule_clear();
        }
    }

    fn schedule_clear(&self) {
        let frames = Arc::clone(&self.frames);
        let delay = self.highlight_delay;
        let mut highlights = self.highlights.lock().unwrap_or_else(PoisonError::into_inner);
        while highlights.try_join_next().is_some() {}
        highlights.spawn(async move {
            tokio::time::sleep(delay).await;
            frames.send_modify(|frame| frame.highlight = None);
        });
    }
}

async fn run_autoplay(shared: Arc<PlayerShared>) {
    loop {
        let interval = {
            let mut state = shared.state.lock().await;
            if !state.timeline.is_playing() {
                state.autoplay_running = false;
                break;
            }
            state.timeline.interval(shared.base_interval)
        };
        tokio::time::sleep(interval).await;

        let mut state = shared.state.lock().await;
        let change = state.timeline.tick();
        shared.publish(&state, change);
        if !state.timeline.is_playing() {
            state.autoplay_running = false;
            debug!(year = state.timeline.selected_year(), "timeline playback finished");
            break;
        }
    }
}

/// Drives a [`Timeline`] with real timers and publishes every state change
/// on a watch channel.
pub struct TimelinePlayer {
    shared: Arc<PlayerShared>,
    autoplay: StdMutex<Option<JoinHandle<()>>>,
}

impl TimelinePlayer {
    pub fn new(
        trips: Vec<Trip>,
        home_country: Option<String>,
        fallback_year: i32,
        base_interval: Duration,
        highlight_delay: Duration,
    ) -> Self {
        let timeline = Timeline::new(years_with_trips(&trips), fallback_year);
        let (frames, _) = watch::channel(TimelineFrame {
            timeline: timeline.snapshot(),
            highlight: None,
        });
        Self {
            shared: Arc::new(PlayerShared {
                state: Mutex::new(PlayerState {
                    timeline,
                    trips,
                    autoplay_running: false,
                }),
                home_country,
                frames: Arc::new(frames),
                highlights: StdMutex::new(JoinSet::new()),
                base_interval,
                highlight_delay,
            }),
            autoplay: StdMutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimelineFrame> {
        self.shared.frames.subscribe()
    }

    pub fn frame(&self) -> TimelineFrame {
        self.shared.frames.borrow().clone()
    }

    pub async fn snapshot(&self) -> TimelineSnapshot {
        self.shared.state.lock().await.timeline.snapshot()
    }

    pub async fn perform(&self, action: TimelineAction) -> TimelineFrame {
        {
            let mut state = self.shared.state.lock().await;
            let timeline = &mut state.timeline;
            let change = match action {
                TimelineAction::First => timeline.first(),
                TimelineAction::Prev => timeline.prev(),
                TimelineAction::Next => timeline.next(),
                TimelineAction::Last => timeline.last(),
                TimelineAction::Select(year) => timeline.select(year),
                TimelineAction::Play => timeline.play(),
                TimelineAction::Pause => {
                    timeline.pause();
                    None
                }
                TimelineAction::Toggle => timeline.toggle(),
                TimelineAction::Speed => {
                    timeline.cycle_speed();
                    None
                }
                TimelineAction::Enable => Some(timeline.enable()),
                TimelineAction::Disable => {
                    timeline.disable();
                    None
                }
            };
            self.shared.publish(&state, change);
            self.sync_autoplay(&mut state);
        }
        self.frame()
    }

    /// Replace the trip history. Keeps the selected year when it survives.
    pub async fn set_trips(&self, trips: Vec<Trip>, fallback_year: i32) {
        let mut state = self.shared.state.lock().await;
        state.timeline.set_years(years_with_trips(&trips), fallback_year);
        state.trips = trips;
        self.shared.publish(&state, None);
        self.sync_autoplay(&mut state);
    }

    /// Start the auto-play task when playing and none is running; stop it
    /// otherwise. Called with the state lock held.
    fn sync_autoplay(&self, state: &mut PlayerState) {
        let mut autoplay = self.autoplay.lock().unwrap_or_else(PoisonError::into_inner);
        let running = state.autoplay_running
            && autoplay.as_ref().is_some_and(|handle| !handle.is_finished());
        match (state.timeline.is_playing(), running) {
            (true, false) => {
                state.autoplay_running = true;
                *autoplay = Some(tokio::spawn(run_autoplay(Arc::clone(&self.shared))));
            }
            (false, true) => {
                state.autoplay_running = false;
                if let Some(handle) = autoplay.take() {
                    handle.abort();
                }
            }
            _ => {}
        }
    }

    /// Cancel auto-play and every pending highlight-clear timer.
    pub fn close(&self) {
        if let Some(handle) = self
            .autoplay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.shared
            .highlights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }
}

impl Drop for TimelinePlayer {
    fn drop(&mut self) {
        self.close();
    }
}
