//! One owner's trips, overlays and timeline, kept consistent by [`Workspace::apply`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use passport_shared::colors::parse_hex_color;
use passport_shared::{
    MapFill, MapOptions, Overlay, TimelineView, Trip, Visit, VisitBuckets, VisitCountMap,
    classify, compose_map, next_upcoming_year, resolve_visits, visit_counts_up_to_year,
    visited_as_of_now, visited_in_year, visited_up_to_year, years_with_trips,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::audit::Auditor;
use crate::config::Settings;
use crate::registry::{
    OverlayRegistry, RegistryError, RegistryPhase, SaveOutcome, SyncOutcome,
};
use crate::services::timeline_player::TimelinePlayer;
use crate::state::ObservabilityCounters;
use crate::store::SharedCollection;
use crate::trips::{TripBook, TripError};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("invalid owner: {0}")]
    InvalidOwner(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Trips(#[from] TripError),
    #[error(transparent)]
    Overlays(#[from] RegistryError),
}

/// Things that invalidate derived state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    OverlaysLoaded,
    TripsChanged,
    VisitedColorChanged(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryVisits {
    pub iso_code: String,
    pub visits: Vec<Visit>,
    #[serde(flatten)]
    pub buckets: VisitBuckets,
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub struct Workspace {
    owner: String,
    trips: TripBook,
    overlays: OverlayRegistry,
    timeline: TimelinePlayer,
    visited_color: RwLock<String>,
    home_country: Option<String>,
    last_used_ms: AtomicI64,
    /// Held across a trip write and the sync that follows it, so syncs land
    /// in write order.
    writes: Mutex<()>,
}

impl Workspace {
    /// Load trips and overlays and run the first sync.
    ///
    /// Trips must load. An overlay load failure leaves the registry in its
    /// error phase; the workspace still opens so trips stay usable.
    pub async fn open(
        owner: &str,
        trips_store: SharedCollection<Trip>,
        overlays_store: SharedCollection<Overlay>,
        settings: &Settings,
        auditor: Auditor,
        observability: Arc<ObservabilityCounters>,
    ) -> Result<Arc<Self>, WorkspaceError> {
        let now = today();
        let trips = TripBook::new(owner, trips_store, auditor.clone());
        let loaded = trips.load(now).await?;

        let overlays = OverlayRegistry::new(
            owner,
            overlays_store,
            settings.visited_color.clone(),
            auditor,
            observability,
        );
        // The registry logs the failure and keeps it in its phase.
        overlays.load().await.ok();

        let timeline = TimelinePlayer::new(
            loaded,
            settings.home_country.clone(),
            now.year(),
            settings.timeline_base_interval,
            settings.timeline_highlight_delay,
        );

        let workspace = Arc::new(Self {
            owner: owner.to_owned(),
            trips,
            overlays,
            timeline,
            visited_color: RwLock::new(settings.visited_color.clone()),
            home_country: settings.home_country.clone(),
            last_used_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            writes: Mutex::new(()),
        });
        if let Err(e) = workspace.apply(WorkspaceEvent::OverlaysLoaded).await {
            warn!(owner, error = %e, "initial visited overlay sync failed");
        }
        Ok(workspace)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn timeline(&self) -> &TimelinePlayer {
        &self.timeline
    }

    pub fn touch(&self) {
        self.last_used_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let idle_ms = now.timestamp_millis() - self.last_used_ms.load(Ordering::Relaxed);
        Duration::from_millis(u64::try_from(idle_ms).unwrap_or(0))
    }

    /// Stop every timer owned by this workspace.
    pub fn close(&self) {
        self.timeline.close();
    }

    fn home(&self) -> Option<&str> {
        self.home_country.as_deref()
    }

    /// Recompute everything derived from trips and push it out: the visited
    /// overlay through the registry and the year list into the timeline.
    pub async fn apply(&self, event: WorkspaceEvent) -> Result<SyncOutcome, WorkspaceError> {
        let _writes = self.writes.lock().await;
        self.apply_locked(event).await
    }

    async fn apply_locked(&self, event: WorkspaceEvent) -> Result<SyncOutcome, WorkspaceError> {
        let now = today();
        if let WorkspaceEvent::VisitedColorChanged(color) = &event {
            *self.visited_color.write().await = color.clone();
        }

        let trips = self.trips.trips().await?;
        if event == WorkspaceEvent::TripsChanged {
            self.timeline.set_trips(trips.clone(), now.year()).await;
        }

        let visited = visited_as_of_now(&trips, now, self.home());
        let color = self.visited_color.read().await.clone();
        Ok(self.overlays.sync(&visited, &color).await?)
    }

    /// Trip writes stand even when the follow-up sync fails; the registry
    /// phase reports the failure.
    async fn after_trips_changed(&self) {
        if let Err(e) = self.apply_locked(WorkspaceEvent::TripsChanged).await {
            warn!(
                owner = %self.owner,
                error = %e,
                "visited overlay sync after trip change failed"
            );
        }
    }

    /// Overlays whose load failed are loaded and synced again before use.
    async fn overlays_ready(&self) -> Result<(), WorkspaceError> {
        if !self.overlays.is_loaded().await {
            self.apply(WorkspaceEvent::OverlaysLoaded).await?;
        }
        Ok(())
    }

    pub async fn trips(&self) -> Result<Vec<Trip>, WorkspaceError> {
        Ok(self.trips.trips().await?)
    }

    pub async fn save_trips(&self, trips: Vec<Trip>) -> Result<Vec<Trip>, WorkspaceError> {
        let _writes = self.writes.lock().await;
        let saved = self.trips.save(trips, today()).await?;
        self.after_trips_changed().await;
        Ok(saved)
    }

    pub async fn add_trip(&self, trip: Trip) -> Result<Trip, WorkspaceError> {
        let _writes = self.writes.lock().await;
        let added = self.trips.add(trip, today()).await?;
        self.after_trips_changed().await;
        Ok(added)
    }

    pub async fn edit_trip(&self, trip: Trip) -> Result<Trip, WorkspaceError> {
        let _writes = self.writes.lock().await;
        let edited = self.trips.edit(trip, today()).await?;
        self.after_trips_changed().await;
        Ok(edited)
    }

    pub async fn remove_trip(&self, id: &str) -> Result<Trip, WorkspaceError> {
        let _writes = self.writes.lock().await;
        let removed = self.trips.remove(id).await?;
        self.after_trips_changed().await;
        Ok(removed)
    }

    pub async fn overlays(&self) -> Result<Vec<Overlay>, WorkspaceError> {
        self.overlays_ready().await?;
        Ok(self.overlays.overlays().await?)
    }

    pub async fn overlay_phase(&self) -> RegistryPhase {
        self.overlays.phase().await
    }

    pub async fn save_overlays(
        &self,
        overlays: Vec<Overlay>,
    ) -> Result<SaveOutcome, WorkspaceError> {
        self.overlays_ready().await?;
        Ok(self.overlays.save(overlays).await?)
    }

    pub async fn add_overlay(&self, overlay: Overlay) -> Result<Overlay, WorkspaceError> {
        self.overlays_ready().await?;
        Ok(self.overlays.add(overlay).await?)
    }

    pub async fn edit_overlay(&self, overlay: Overlay) -> Result<Overlay, WorkspaceError> {
        self.overlays_ready().await?;
        Ok(self.overlays.edit(overlay).await?)
    }

    pub async fn remove_overlay(&self, id: &str) -> Result<Overlay, WorkspaceError> {
        self.overlays_ready().await?;
        Ok(self.overlays.remove(id).await?)
    }

    pub async fn reorder_overlays(&self, ids: &[String]) -> Result<Vec<Overlay>, WorkspaceError> {
        self.overlays_ready().await?;
        Ok(self.overlays.reorder(ids).await?)
    }

    pub async fn visited_color(&self) -> String {
        self.visited_color.read().await.clone()
    }

    pub async fn set_visited_color(&self, color: &str) -> Result<SyncOutcome, WorkspaceError> {
        let color = color.trim();
        if parse_hex_color(color).is_none() {
            return Err(WorkspaceError::Invalid(format!(
                "visited color must be a hex color, got {color:?}"
            )));
        }
        let outcome = self
            .apply(WorkspaceEvent::VisitedColorChanged(color.to_lowercase()))
            .await?;
        info!(owner = %self.owner, color, "visited color changed");
        Ok(outcome)
    }

    /// Visited as of today, or the countries with a trip in `year`.
    pub async fn visited(&self, year: Option<i32>) -> Result<Vec<String>, WorkspaceError> {
        let trips = self.trips.trips().await?;
        Ok(match year {
            Some(year) => visited_in_year(&trips, year, self.home()),
            None => visited_as_of_now(&trips, today(), self.home()),
        })
    }

    pub async fn country_visits(&self, iso_code: &str) -> Result<CountryVisits, WorkspaceError> {
        let trips = self.trips.trips().await?;
        let visits = resolve_visits(&trips, iso_code);
        let buckets = classify(&visits, today());
        Ok(CountryVisits {
            iso_code: iso_code.trim().to_uppercase(),
            visits,
            buckets,
        })
    }

    /// Visit counts up to `year`, this year when absent.
    pub async fn visit_counts(&self, year: Option<i32>) -> Result<VisitCountMap, WorkspaceError> {
        let trips = self.trips.trips().await?;
        let now = today();
        Ok(visit_counts_up_to_year(
            &trips,
            year.unwrap_or(now.year()),
            now,
            self.home(),
        ))
    }

    pub async fn upcoming(&self) -> Result<BTreeMap<String, i32>, WorkspaceError> {
        let trips = self.trips.trips().await?;
        Ok(next_upcoming_year(&trips, today()))
    }

    /// Years with trips, or just this year when there are none.
    pub async fn years(&self) -> Result<Vec<i32>, WorkspaceError> {
        let trips = self.trips.trips().await?;
        let years = years_with_trips(&trips);
        if years.is_empty() {
            return Ok(vec![today().year()]);
        }
        Ok(years)
    }

    /// Composited fill per country. Follows the timeline when it is enabled.
    pub async fn map(
        &self,
        fallback: &str,
        shade: bool,
    ) -> Result<BTreeMap<String, MapFill>, WorkspaceError> {
        self.overlays_ready().await?;
        let collection = self
            .overlays
            .collection()
            .await
            .ok_or(RegistryError::NotReady)?;
        let trips = self.trips.trips().await?;
        let now = today();
        let snapshot = self.timeline.snapshot().await;

        let view = snapshot.enabled.then(|| TimelineView {
            year: snapshot.selected_year,
            in_year: visited_in_year(&trips, snapshot.selected_year, self.home()),
            up_to_year: visited_up_to_year(&trips, snapshot.selected_year, now, self.home()),
        });
        let count_year = view.as_ref().map_or(now.year(), |view| view.year);
        let counts =
            shade.then(|| visit_counts_up_to_year(&trips, count_year, now, self.home()));

        let options = MapOptions {
            fallback,
            visit_counts: counts.as_ref(),
            timeline: view.as_ref(),
        };
        Ok(compose_map(&collection, options))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{Datelike, Utc};
    use passport_shared::{Overlay, OverlayRecord, Trip, VISITED_OVERLAY_ID};

    use async_trait::async_trait;

    use super::{Workspace, WorkspaceError, today};
    use crate::audit::Auditor;
    use crate::config::Settings;
    use crate::registry::{RegistryPhase, SyncOutcome};
    use crate::services::timeline_player::TimelineAction;
    use crate::state::ObservabilityCounters;
    use crate::store::{Collection, MemoryCollection, StoreError};

    fn past_trip(id: &str, codes: &[&str], year: i32) -> Trip {
        let mut trip = Trip::new(id, format!("Trip {id}"));
        trip.country_codes = codes.iter().map(|code| code.to_string()).collect();
        trip.start_date = Some(format!("{year}-03-01"));
        trip.end_date = Some(format!("{year}-03-10"));
        trip
    }

    struct Fixture {
        trips: Arc<MemoryCollection<Trip>>,
        overlays: Arc<MemoryCollection<Overlay>>,
        observability: Arc<ObservabilityCounters>,
        workspace: Arc<Workspace>,
    }

    async fn open(trips: Vec<Trip>, overlays: Vec<Overlay>) -> Fixture {
        let trips = Arc::new(MemoryCollection::with_items(trips));
        let overlays = Arc::new(MemoryCollection::with_items(overlays));
        let observability = Arc::new(ObservabilityCounters::default());
        let workspace = Workspace::open(
            "guest",
            trips.clone(),
            overlays.clone(),
            &Settings::default(),
            Auditor::tracing_only(observability.clone()),
            observability.clone(),
        )
        .await
        .expect("open workspace");
        Fixture {
            trips,
            overlays,
            observability,
            workspace,
        }
    }

    /// Trip store whose writes take a while, so concurrent writers overlap.
    struct SlowTrips(MemoryCollection<Trip>);

    impl SlowTrips {
        async fn pause() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[async_trait]
    impl Collection<Trip> for SlowTrips {
        async fn load(&self) -> Result<Vec<Trip>, StoreError> {
            self.0.load().await
        }

        async fn save(&self, items: &[Trip]) -> Result<(), StoreError> {
            Self::pause().await;
            self.0.save(items).await
        }

        async fn add(&self, item: &Trip) -> Result<(), StoreError> {
            Self::pause().await;
            self.0.add(item).await
        }

        async fn edit(&self, item: &Trip) -> Result<(), StoreError> {
            Self::pause().await;
            self.0.edit(item).await
        }

        async fn remove(&self, id: &str) -> Result<(), StoreError> {
            Self::pause().await;
            self.0.remove(id).await
        }

        async fn reorder(&self, items: &[Trip]) -> Result<(), StoreError> {
            self.0.reorder(items).await
        }
    }

    fn visited_countries(overlays: &[Overlay]) -> Vec<String> {
        overlays
            .iter()
            .find(|overlay| overlay.id() == VISITED_OVERLAY_ID)
            .map(|overlay| overlay.countries().to_vec())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn open_syncs_visited_overlay_from_trips() {
        let year = today().year() - 2;
        let fx = open(vec![past_trip("a", &["FR", "DE"], year)], Vec::new()).await;

        let stored = fx.overlays.load().await.expect("stored overlays");
        assert_eq!(visited_countries(&stored), vec!["FR", "DE"]);
        assert_eq!(fx.overlays.write_count(), 1);
        assert_eq!(fx.workspace.overlay_phase().await, RegistryPhase::Ready);
    }

    #[tokio::test]
    async fn trip_edits_resync_and_identical_state_skips() {
        let year = today().year() - 2;
        let fx = open(vec![past_trip("a", &["FR"], year)], Vec::new()).await;

        fx.workspace
            .add_trip(past_trip("b", &["JP"], year - 1))
            .await
            .expect("add trip");
        let stored = fx.overlays.load().await.expect("stored overlays");
        assert_eq!(visited_countries(&stored), vec!["FR", "JP"]);
        assert_eq!(fx.overlays.write_count(), 2);

        let outcome = fx
            .workspace
            .apply(super::WorkspaceEvent::TripsChanged)
            .await
            .expect("resync");
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(fx.overlays.write_count(), 2);
        assert!(fx.observability.snapshot().sync_skips_total >= 1);

        let snapshot = fx.workspace.timeline().snapshot().await;
        assert_eq!(snapshot.years, vec![year - 1, year]);

        fx.workspace.remove_trip("b").await.expect("remove trip");
        let stored = fx.overlays.load().await.expect("stored overlays");
        assert_eq!(visited_countries(&stored), vec!["FR"]);
        assert_eq!(fx.trips.load().await.expect("trips").len(), 1);
    }

    #[tokio::test]
    async fn visited_color_change_is_validated_and_synced() {
        let fx = open(Vec::new(), Vec::new()).await;
        assert!(matches!(
            fx.workspace.set_visited_color("green").await,
            Err(WorkspaceError::Invalid(_))
        ));

        let outcome = fx
            .workspace
            .set_visited_color("#FF0000")
            .await
            .expect("set color");
        assert_eq!(outcome, SyncOutcome::Updated);
        let stored = fx.overlays.load().await.expect("stored overlays");
        let visited = stored
            .iter()
            .find(|overlay| overlay.is_visited_system())
            .expect("visited overlay");
        assert_eq!(visited.color(), "#ff0000");
        assert_eq!(fx.workspace.visited_color().await, "#ff0000");
    }

    #[tokio::test]
    async fn trip_write_survives_failed_sync() {
        let year = today().year() - 2;
        let fx = open(Vec::new(), Vec::new()).await;
        fx.overlays.set_fail_writes(true);

        let added = fx
            .workspace
            .add_trip(past_trip("a", &["IT"], year))
            .await
            .expect("trip write succeeds");
        assert_eq!(added.id, "a");
        assert!(matches!(
            fx.workspace.overlay_phase().await,
            RegistryPhase::Error(_)
        ));
        assert_eq!(fx.observability.snapshot().persist_failures_total, 1);

        fx.overlays.set_fail_writes(false);
        let outcome = fx
            .workspace
            .apply(super::WorkspaceEvent::TripsChanged)
            .await
            .expect("retry");
        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(fx.workspace.overlay_phase().await, RegistryPhase::Ready);
    }

    #[tokio::test]
    async fn overlays_recover_after_failed_load() {
        let year = today().year() - 2;
        let trips = Arc::new(MemoryCollection::with_items(Vec::<Trip>::new()));
        let overlays = Arc::new(MemoryCollection::<Overlay>::new());
        overlays.set_fail_loads(true);
        let observability = Arc::new(ObservabilityCounters::default());
        let workspace = Workspace::open(
            "guest",
            trips,
            overlays.clone(),
            &Settings::default(),
            Auditor::tracing_only(observability.clone()),
            observability,
        )
        .await
        .expect("trips still open the workspace");
        assert!(matches!(
            workspace.overlay_phase().await,
            RegistryPhase::Error(_)
        ));

        overlays.set_fail_loads(false);
        workspace
            .add_trip(past_trip("a", &["FR"], year))
            .await
            .expect("add trip");
        assert_eq!(workspace.overlay_phase().await, RegistryPhase::Ready);
        let stored = overlays.load().await.expect("stored overlays");
        assert_eq!(visited_countries(&stored), vec!["FR"]);

        let added = workspace
            .add_overlay(Overlay::Regular(OverlayRecord::new("w", "Wishlist", "#0000ff")))
            .await
            .expect("add overlay");
        assert_eq!(added.id(), "w");
    }

    #[tokio::test]
    async fn overlay_reads_retry_a_failed_load() {
        let year = today().year() - 2;
        let trips = Arc::new(MemoryCollection::with_items(vec![past_trip("a", &["JP"], year)]));
        let overlays = Arc::new(MemoryCollection::<Overlay>::new());
        overlays.set_fail_loads(true);
        let observability = Arc::new(ObservabilityCounters::default());
        let workspace = Workspace::open(
            "guest",
            trips,
            overlays.clone(),
            &Settings::default(),
            Auditor::tracing_only(observability.clone()),
            observability,
        )
        .await
        .expect("open workspace");
        assert!(matches!(
            workspace.overlays().await,
            Err(WorkspaceError::Overlays(_))
        ));

        overlays.set_fail_loads(false);
        let listed = workspace.overlays().await.expect("overlays after recovery");
        assert_eq!(visited_countries(&listed), vec!["JP"]);
        let map = workspace.map("#cccccc", false).await.expect("map");
        assert!(map.contains_key("JP"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_trip_writes_leave_overlay_and_timeline_current() {
        let base = today().year() - 10;
        let trips: Arc<SlowTrips> = Arc::new(SlowTrips(MemoryCollection::new()));
        let overlays = Arc::new(MemoryCollection::<Overlay>::new());
        let observability = Arc::new(ObservabilityCounters::default());
        let workspace = Workspace::open(
            "guest",
            trips,
            overlays.clone(),
            &Settings::default(),
            Auditor::tracing_only(observability.clone()),
            observability,
        )
        .await
        .expect("open workspace");

        let codes = ["FR", "DE", "IT", "ES", "PT", "NL", "BE", "AT"];
        let mut writers = tokio::task::JoinSet::new();
        for (i, code) in codes.iter().copied().enumerate() {
            let workspace = workspace.clone();
            let trip = past_trip(&format!("t{i}"), &[code], base + i as i32);
            writers.spawn(async move { workspace.add_trip(trip).await });
        }
        while let Some(result) = writers.join_next().await {
            result.expect("writer task").expect("add trip");
        }

        let stored = overlays.load().await.expect("stored overlays");
        let mut visited = visited_countries(&stored);
        visited.sort();
        let mut expected: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        expected.sort();
        assert_eq!(visited, expected);

        let snapshot = workspace.timeline().snapshot().await;
        let years: Vec<i32> = (0..codes.len() as i32).map(|i| base + i).collect();
        assert_eq!(snapshot.years, years);
        workspace.close();
    }

    #[tokio::test]
    async fn queries_cover_visits_counts_and_years() {
        let year = today().year() - 3;
        let fx = open(
            vec![
                past_trip("a", &["FR"], year),
                past_trip("b", &["FR", "ES"], year + 1),
            ],
            Vec::new(),
        )
        .await;

        let visits = fx.workspace.country_visits("fr").await.expect("visits");
        assert_eq!(visits.iso_code, "FR");
        assert_eq!(visits.visits.len(), 2);
        assert_eq!(visits.buckets.past.len(), 2);

        let counts = fx.workspace.visit_counts(None).await.expect("counts");
        assert_eq!(counts.get("FR"), Some(&2));
        assert_eq!(counts.get("ES"), Some(&1));

        assert_eq!(
            fx.workspace.visited(Some(year)).await.expect("in year"),
            vec!["FR"]
        );
        assert_eq!(
            fx.workspace.years().await.expect("years"),
            vec![year, year + 1]
        );

        let empty = open(Vec::new(), Vec::new()).await;
        assert_eq!(
            empty.workspace.years().await.expect("fallback year"),
            vec![Utc::now().year()]
        );
    }

    #[tokio::test]
    async fn map_follows_timeline_selection() {
        let year = today().year() - 3;
        let mut custom = OverlayRecord::new("wish", "Wishlist", "#0000ff");
        custom.countries = vec!["FR".to_string(), "BR".to_string()];
        custom.timeline_enabled = true;
        let fx = open(
            vec![
                past_trip("a", &["FR"], year),
                past_trip("b", &["ES"], year + 1),
            ],
            vec![Overlay::Regular(custom)],
        )
        .await;

        let map = fx.workspace.map("#cccccc", false).await.expect("map");
        assert_eq!(map["BR"].color, "#0000ff");
        assert_eq!(map["FR"].color, "#4caf50");
        assert!(map.contains_key("ES"));

        fx.workspace.timeline().perform(TimelineAction::Enable).await;
        fx.workspace
            .timeline()
            .perform(TimelineAction::Select(year))
            .await;
        let map = fx.workspace.map("#cccccc", true).await.expect("timeline map");
        assert!(!map.contains_key("BR"));
        assert!(!map.contains_key("ES"));
        assert_eq!(map["FR"].visits, Some(1));
        assert_eq!(
            map["FR"].overlay_ids,
            vec![VISITED_OVERLAY_ID.to_string(), "wish".to_string()]
        );
        fx.workspace.close();
    }

    #[tokio::test]
    async fn idle_time_tracks_touch() {
        let fx = open(Vec::new(), Vec::new()).await;
        let later = Utc::now() + chrono::Duration::seconds(90);
        assert!(fx.workspace.idle_for(later) >= Duration::from_secs(89));
        fx.workspace.touch();
        assert!(fx.workspace.idle_for(Utc::now()) < Duration::from_secs(5));
    }
}
