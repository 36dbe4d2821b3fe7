use chrono::NaiveDate;
use passport_shared::Trip;
use tokio::sync::RwLock;
use tracing::warn;

use crate::audit::{AuditEvent, Auditor, TRIP_ADDED, TRIP_EDITED, TRIP_REMOVED, TRIPS_SAVED};
use crate::store::{SharedCollection, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TripError {
    #[error("trips are not loaded")]
    NotReady,
    #[error("trip {0} not found")]
    NotFound(String),
    #[error("trip {0} already exists")]
    AlreadyExists(String),
    #[error("invalid trip: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TripError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::AlreadyExists(id) => Self::AlreadyExists(id),
            other => Self::Store(other),
        }
    }
}

/// One owner's trips. Status is recomputed from dates on load and on every
/// write, so the cached value never goes stale relative to `now`.
pub struct TripBook {
    owner: String,
    store: SharedCollection<Trip>,
    auditor: Auditor,
    trips: RwLock<Option<Vec<Trip>>>,
}

fn validate(trip: &Trip) -> Result<(), TripError> {
    if trip.id.trim().is_empty() {
        return Err(TripError::Invalid("trip id cannot be empty".to_string()));
    }
    Ok(())
}

impl TripBook {
    pub fn new(owner: impl Into<String>, store: SharedCollection<Trip>, auditor: Auditor) -> Self {
        Self {
            owner: owner.into(),
            store,
            auditor,
            trips: RwLock::new(None),
        }
    }

    fn audit(&self, code: i32, payload: serde_json::Value) {
        self.auditor
            .emit(AuditEvent::new(code, payload, self.owner.clone()));
    }

    pub async fn load(&self, now: NaiveDate) -> Result<Vec<Trip>, TripError> {
        let mut trips = self.store.load().await.map_err(|e| {
            warn!(owner = %self.owner, error = %e, "failed to load trips");
            TripError::from(e)
        })?;
        for trip in &mut trips {
            trip.refresh_status(now);
        }
        *self.trips.write().await = Some(trips.clone());
        Ok(trips)
    }

    pub async fn trips(&self) -> Result<Vec<Trip>, TripError> {
        self.trips.read().await.clone().ok_or(TripError::NotReady)
    }

    /// Replace every trip. An empty list clears the book.
    pub async fn save(
        &self,
        mut trips: Vec<Trip>,
        now: NaiveDate,
    ) -> Result<Vec<Trip>, TripError> {
        let mut guard = self.trips.write().await;
        if guard.is_none() {
            return Err(TripError::NotReady);
        }
        for trip in &mut trips {
            validate(trip)?;
            trip.normalize(now);
        }
        self.store.save(&trips).await?;
        *guard = Some(trips.clone());
        drop(guard);

        self.audit(TRIPS_SAVED, serde_json::json!({ "count": trips.len() }));
        Ok(trips)
    }

    pub async fn add(&self, mut trip: Trip, now: NaiveDate) -> Result<Trip, TripError> {
        validate(&trip)?;
        trip.normalize(now);
        let mut guard = self.trips.write().await;
        let Some(trips) = guard.as_mut() else {
            return Err(TripError::NotReady);
        };
        if trips.iter().any(|existing| existing.id == trip.id) {
            return Err(TripError::AlreadyExists(trip.id));
        }
        self.store.add(&trip).await?;
        trips.push(trip.clone());
        drop(guard);

        self.audit(
            TRIP_ADDED,
            serde_json::json!({
                "id": trip.id,
                "name": trip.name,
                "countries": trip.country_codes,
            }),
        );
        Ok(trip)
    }

    pub async fn edit(&self, mut trip: Trip, now: NaiveDate) -> Result<Trip, TripError> {
        validate(&trip)?;
        trip.normalize(now);
        let mut guard = self.trips.write().await;
        let Some(trips) = guard.as_mut() else {
            return Err(TripError::NotReady);
        };
        let Some(index) = trips.iter().position(|existing| existing.id == trip.id) else {
            return Err(TripError::NotFound(trip.id));
        };
        self.store.edit(&trip).await?;
        trips[index] = trip.clone();
        drop(guard);

        self.audit(
            TRIP_EDITED,
            serde_json::json!({ "id": trip.id, "name": trip.name }),
        );
        Ok(trip)
    }

    pub async fn remove(&self, id: &str) -> Result<Trip, TripError> {
        let mut guard = self.trips.write().await;
        let Some(trips) = guard.as_mut() else {
            return Err(TripError::NotReady);
        };
        let Some(index) = trips.iter().position(|existing| existing.id == id) else {
            return Err(TripError::NotFound(id.to_owned()));
        };
        self.store.remove(id).await?;
        let removed = trips.remove(index);
        drop(guard);

        self.audit(
            TRIP_REMOVED,
            serde_json::json!({ "id": removed.id, "name": removed.name }),
        );
        Ok(removed)
    }
}
