use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use passport_shared::{Overlay, Trip};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::info;

use crate::audit::{AuditSink, Auditor, FanoutAuditSink, PgAuditSink, TracingAuditSink};
use crate::config::{GUEST_OWNER, Settings};
use crate::store::{
    FileCollection, OVERLAYS_COLLECTION, PgCollection, SharedCollection, TRIPS_COLLECTION,
};
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL pool for signed-in users. None if DATABASE_URL is not set.
    pub db: Option<PgPool>,
    pub settings: Arc<Settings>,
    /// Open workspaces keyed by owner.
    pub workspaces: Arc<DashMap<String, Arc<Workspace>>>,
    pub auditor: Auditor,
    pub observability: Arc<ObservabilityCounters>,
    opening: Arc<Mutex<()>>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    sync_writes_total: AtomicU64,
    sync_skips_total: AtomicU64,
    empty_save_rejections_total: AtomicU64,
    persist_failures_total: AtomicU64,
    audit_failures_total: AtomicU64,
    workspaces_opened_total: AtomicU64,
    workspaces_evicted_total: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub sync_writes_total: u64,
    pub sync_skips_total: u64,
    pub empty_save_rejections_total: u64,
    pub persist_failures_total: u64,
    pub audit_failures_total: u64,
    pub workspaces_opened_total: u64,
    pub workspaces_evicted_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            sync_writes_total: self.sync_writes_total.load(Ordering::Relaxed),
            sync_skips_total: self.sync_skips_total.load(Ordering::Relaxed),
            empty_save_rejections_total: self.empty_save_rejections_total.load(Ordering::Relaxed),
            persist_failures_total: self.persist_failures_total.load(Ordering::Relaxed),
            audit_failures_total: self.audit_failures_total.load(Ordering::Relaxed),
            workspaces_opened_total: self.workspaces_opened_total.load(Ordering::Relaxed),
            workspaces_evicted_total: self.workspaces_evicted_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_sync_write(&self) {
        self.sync_writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync_skip(&self) {
        self.sync_skips_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_save_rejection(&self) {
        self.empty_save_rejections_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workspace_opened(&self) {
        self.workspaces_opened_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_workspaces_evicted(&self, count: u64) {
        self.workspaces_evicted_total
            .fetch_add(count, Ordering::Relaxed);
    }
}

/// Rejects owner ids that cannot be used as a directory or document key.
pub fn validate_owner(owner: &str) -> Result<(), WorkspaceError> {
    if owner.trim().is_empty() {
        return Err(WorkspaceError::InvalidOwner(
            "owner id cannot be empty".to_string(),
        ));
    }
    if owner.contains('/') || owner.contains('\\') || owner.contains("..") {
        return Err(WorkspaceError::InvalidOwner(format!(
            "owner id contains invalid characters: {owner:?}"
        )));
    }
    if owner.chars().any(|c| c.is_control()) {
        return Err(WorkspaceError::InvalidOwner(format!(
            "owner id contains control characters: {owner:?}"
        )));
    }
    Ok(())
}

impl AppState {
    pub fn new(db: Option<PgPool>, settings: Settings) -> Self {
        let observability = Arc::new(ObservabilityCounters::default());
        let sink: Arc<dyn AuditSink> = match db.as_ref() {
            Some(pool) => Arc::new(FanoutAuditSink::new(vec![
                Arc::new(TracingAuditSink),
                Arc::new(PgAuditSink::new(pool.clone())),
            ])),
            None => Arc::new(TracingAuditSink),
        };
        Self {
            db,
            settings: Arc::new(settings),
            workspaces: Arc::new(DashMap::new()),
            auditor: Auditor::new(sink, Arc::clone(&observability)),
            observability,
            opening: Arc::new(Mutex::new(())),
        }
    }

    /// Guest sessions use the local embedded store; anyone else the remote
    /// per-user collection.
    fn stores_for(
        &self,
        owner: &str,
    ) -> Result<(SharedCollection<Trip>, SharedCollection<Overlay>), WorkspaceError> {
        if owner == GUEST_OWNER {
            let root = &self.settings.data_dir;
            return Ok((
                Arc::new(FileCollection::<Trip>::in_dir(root, owner, TRIPS_COLLECTION)),
                Arc::new(FileCollection::<Overlay>::in_dir(
                    root,
                    owner,
                    OVERLAYS_COLLECTION,
                )),
            ));
        }
        let Some(pool) = self.db.as_ref() else {
            return Err(WorkspaceError::Unavailable(
                "remote document store is not configured".to_string(),
            ));
        };
        Ok((
            Arc::new(PgCollection::<Trip>::new(pool.clone(), owner, TRIPS_COLLECTION)),
            Arc::new(PgCollection::<Overlay>::new(
                pool.clone(),
                owner,
                OVERLAYS_COLLECTION,
            )),
        ))
    }

    /// Cached workspace for `owner`, opened on first use.
    pub async fn workspace(&self, owner: &str) -> Result<Arc<Workspace>, WorkspaceError> {
        validate_owner(owner)?;
        if let Some(existing) = self.workspaces.get(owner) {
            existing.touch();
            return Ok(Arc::clone(existing.value()));
        }

        let _guard = self.opening.lock().await;
        if let Some(existing) = self.workspaces.get(owner) {
            existing.touch();
            return Ok(Arc::clone(existing.value()));
        }

        let (trips, overlays) = self.stores_for(owner)?;
        let workspace = Workspace::open(
            owner,
            trips,
            overlays,
            &self.settings,
            self.auditor.clone(),
            Arc::clone(&self.observability),
        )
        .await?;
        self.workspaces
            .insert(owner.to_owned(), Arc::clone(&workspace));
        self.observability.record_workspace_opened();
        info!(owner, "opened workspace");
        Ok(workspace)
    }

    /// Open a workspace over caller-provided stores, bypassing backend selection.
    #[cfg(test)]
    pub async fn install_workspace(
        &self,
        owner: &str,
        trips: SharedCollection<Trip>,
        overlays: SharedCollection<Overlay>,
    ) -> Arc<Workspace> {
        let workspace = Workspace::open(
            owner,
            trips,
            overlays,
            &self.settings,
            self.auditor.clone(),
            Arc::clone(&self.observability),
        )
        .await
        .expect("open test workspace");
        self.workspaces
            .insert(owner.to_owned(), Arc::clone(&workspace));
        workspace
    }
}
