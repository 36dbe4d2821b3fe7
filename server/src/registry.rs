//! Overlay registry: owns one owner's overlay collection and keeps the
//! "Visited Countries" overlay in step with the trip history.

use std::sync::Arc;

use passport_shared::{Overlay, OverlayCollection, OverlayError, reconcile_visited};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::audit::{
    AuditEvent, Auditor, OVERLAY_ADDED, OVERLAY_EDITED, OVERLAY_REMOVED, OVERLAYS_REORDERED,
    OVERLAYS_SAVED, VISITED_OVERLAY_SYNCED,
};
use crate::state::ObservabilityCounters;
use crate::store::{SharedCollection, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "message", rename_all = "lowercase")]
pub enum RegistryPhase {
    Loading,
    Ready,
    Syncing,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    /// Overlays have not finished their first load.
    NotLoaded,
    Unchanged,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveOutcome {
    /// Empty input, refused to protect the stored collection.
    Skipped,
    Saved,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("overlays are not loaded")]
    NotReady,
    #[error("overlay {0} not found")]
    NotFound(String),
    #[error("overlay {0} is system-owned")]
    ReservedOverlay(String),
    #[error("overlay {0} already exists")]
    Duplicate(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OverlayError> for RegistryError {
    fn from(e: OverlayError) -> Self {
        match e {
            OverlayError::Reserved(id) => Self::ReservedOverlay(id),
            OverlayError::NotFound(id) => Self::NotFound(id),
            OverlayError::Duplicate(id) => Self::Duplicate(id),
        }
    }
}

struct RegistryInner {
    phase: RegistryPhase,
    collection: Option<OverlayCollection>,
    visited_color: String,
    /// The stored collection has no visited overlay yet (it was synthesized on
    /// load), so partial writes touching it must fall back to a full save.
    visited_unsaved: bool,
}

impl RegistryInner {
    fn loaded(&self) -> Result<&OverlayCollection, RegistryError> {
        self.collection.as_ref().ok_or(RegistryError::NotReady)
    }

    /// The last load failed and nothing is cached.
    fn needs_reload(&self) -> bool {
        self.collection.is_none() && matches!(self.phase, RegistryPhase::Error(_))
    }
}

pub struct OverlayRegistry {
    owner: String,
    store: SharedCollection<Overlay>,
    auditor: Auditor,
    observability: Arc<ObservabilityCounters>,
    inner: Mutex<RegistryInner>,
}

impl OverlayRegistry {
    pub fn new(
        owner: impl Into<String>,
        store: SharedCollection<Overlay>,
        visited_color: impl Into<String>,
        auditor: Auditor,
        observability: Arc<ObservabilityCounters>,
    ) -> Self {
        Self {
            owner: owner.into(),
            store,
            auditor,
            observability,
            inner: Mutex::new(RegistryInner {
                phase: RegistryPhase::Loading,
                collection: None,
                visited_color: visited_color.into(),
                visited_unsaved: false,
            }),
        }
    }

    fn audit(&self, code: i32, payload: serde_json::Value) {
        self.auditor
            .emit(AuditEvent::new(code, payload, self.owner.clone()));
    }

    pub async fn phase(&self) -> RegistryPhase {
        self.inner.lock().await.phase.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.lock().await.collection.is_some()
    }

    /// Current collection, if loaded.
    pub async fn collection(&self) -> Option<OverlayCollection> {
        self.inner.lock().await.collection.clone()
    }

    pub async fn overlays(&self) -> Result<Vec<Overlay>, RegistryError> {
        Ok(self.lock_loaded().await?.loaded()?.to_vec())
    }

    /// Read the stored overlays, sorted, with the visited overlay guaranteed.
    pub async fn load(&self) -> Result<Vec<Overlay>, RegistryError> {
        let mut inner = self.inner.lock().await;
        self.load_into(&mut inner).await
    }

    async fn load_into(&self, inner: &mut RegistryInner) -> Result<Vec<Overlay>, RegistryError> {
        inner.phase = RegistryPhase::Loading;
        let stored = match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(owner = %self.owner, error = %e, "failed to load overlays");
                inner.phase = RegistryPhase::Error(e.to_string());
                return Err(e.into());
            }
        };

        let had_visited = stored.iter().any(Overlay::is_visited_system);
        let collection = OverlayCollection::from_loaded(stored, &inner.visited_color);
        let overlays = collection.to_vec();
        inner.collection = Some(collection);
        inner.visited_unsaved = !had_visited;
        inner.phase = RegistryPhase::Ready;
        Ok(overlays)
    }

    /// Lock the registry, loading again first when the last load failed.
    async fn lock_loaded(&self) -> Result<MutexGuard<'_, RegistryInner>, RegistryError> {
        let mut inner = self.inner.lock().await;
        if inner.needs_reload() {
            self.load_into(&mut inner).await?;
            info!(owner = %self.owner, "overlays loaded after an earlier failure");
        }
        Ok(inner)
    }

    /// Replace the whole collection. An empty list is refused.
    pub async fn save(&self, overlays: Vec<Overlay>) -> Result<SaveOutcome, RegistryError> {
        if overlays.is_empty() {
            warn!(owner = %self.owner, "refusing to save an empty overlay collection");
            self.observability.record_empty_save_rejection();
            return Ok(SaveOutcome::Skipped);
        }

        let mut inner = self.lock_loaded().await?;
        let current = inner.loaded()?;
        let visited_countries = current.visited().countries.clone();
        let visited_color = current.visited().color.clone();

        let mut provided = overlays;
        if !provided.iter().any(Overlay::is_visited_system) {
            provided.push(Overlay::VisitedSystem(current.visited().clone()));
        }
        let mut next = OverlayCollection::from_loaded(provided, &inner.visited_color);
        // Countries and color of the visited overlay are never taken from callers.
        if let Some(restored) = next.with_visited(&visited_countries, &visited_color) {
            next = restored;
        }

        let items = next.to_vec();
        if let Err(e) = self.store.save(&items).await {
            self.observability.record_persist_failure();
            return Err(e.into());
        }
        inner.collection = Some(next);
        inner.visited_unsaved = false;
        drop(inner);

        self.audit(OVERLAYS_SAVED, serde_json::json!({ "count": items.len() }));
        Ok(SaveOutcome::Saved)
    }

    pub async fn add(&self, overlay: Overlay) -> Result<Overlay, RegistryError> {
        let mut inner = self.lock_loaded().await?;
        let mut next = inner.loaded()?.clone();
        let added = next.add(overlay)?;
        self.store.add(&added).await?;
        inner.collection = Some(next);
        drop(inner);

        self.audit(
            OVERLAY_ADDED,
            serde_json::json!({ "id": added.id(), "name": added.name() }),
        );
        Ok(added)
    }

    pub async fn edit(&self, overlay: Overlay) -> Result<Overlay, RegistryError> {
        let mut inner = self.lock_loaded().await?;
        let mut next = inner.loaded()?.clone();
        let edited = next.edit(overlay)?;
        if edited.is_visited_system() && inner.visited_unsaved {
            self.store.save(&next.to_vec()).await?;
            inner.visited_unsaved = false;
        } else {
            self.store.edit(&edited).await?;
        }
        inner.collection = Some(next);
        drop(inner);

        self.audit(
            OVERLAY_EDITED,
            serde_json::json!({ "id": edited.id(), "name": edited.name() }),
        );
        Ok(edited)
    }

    pub async fn remove(&self, id: &str) -> Result<Overlay, RegistryError> {
        let mut inner = self.lock_loaded().await?;
        let mut next = inner.loaded()?.clone();
        // Resolve the display name before the record is gone.
        let name = next.get(id).map(|overlay| overlay.name().to_owned());
        let removed = next.remove(id)?;
        self.store.remove(id).await?;
        inner.collection = Some(next);
        drop(inner);

        self.audit(
            OVERLAY_REMOVED,
            serde_json::json!({ "id": id, "name": name }),
        );
        Ok(removed)
    }

    /// Give each listed overlay `order = index`. Only overlays whose order
    /// changed are written.
    pub async fn reorder(&self, ids: &[String]) -> Result<Vec<Overlay>, RegistryError> {
        let mut inner = self.lock_loaded().await?;
        let mut next = inner.loaded()?.clone();
        let changed = next.reorder(ids)?;
        if changed.is_empty() {
            return Ok(changed);
        }

        let touches_visited = changed.iter().any(Overlay::is_visited_system);
        if touches_visited && inner.visited_unsaved {
            self.store.save(&next.to_vec()).await?;
            inner.visited_unsaved = false;
        } else {
            self.store.reorder(&changed).await?;
        }
        inner.collection = Some(next);
        drop(inner);

        self.audit(
            OVERLAYS_REORDERED,
            serde_json::json!({
                "ids": changed.iter().map(Overlay::id).collect::<Vec<_>>()
            }),
        );
        Ok(changed)
    }

    /// Bring the visited overlay in line with `visited` and `color`.
    ///
    /// Writes the whole collection only when countries (order included) or
    /// color differ. In-memory state changes only after the write succeeds.
    pub async fn sync(
        &self,
        visited: &[String],
        color: &str,
    ) -> Result<SyncOutcome, RegistryError> {
        let mut inner = self.inner.lock().await;
        inner.visited_color = color.to_owned();
        if inner.needs_reload() {
            self.load_into(&mut inner).await?;
        }
        let Some(current) = inner.collection.as_ref() else {
            return Ok(SyncOutcome::NotLoaded);
        };

        let Some(next) = reconcile_visited(current, visited, color) else {
            self.observability.record_sync_skip();
            if matches!(inner.phase, RegistryPhase::Error(_)) {
                inner.phase = RegistryPhase::Ready;
            }
            return Ok(SyncOutcome::Unchanged);
        };

        inner.phase = RegistryPhase::Syncing;
        if let Err(e) = self.store.save(&next.to_vec()).await {
            warn!(owner = %self.owner, error = %e, "failed to persist visited overlay");
            self.observability.record_persist_failure();
            inner.phase = RegistryPhase::Error(e.to_string());
            return Err(e.into());
        }

        inner.collection = Some(next);
        inner.visited_unsaved = false;
        inner.phase = RegistryPhase::Ready;
        drop(inner);

        self.observability.record_sync_write();
        info!(
            owner = %self.owner,
            countries = visited.len(),
            color,
            "synced visited overlay"
        );
        self.audit(
            VISITED_OVERLAY_SYNCED,
            serde_json::json!({ "countries": visited, "color": color }),
        );
        Ok(SyncOutcome::Updated)
    }
}
