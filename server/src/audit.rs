//! Best-effort activity log. Emitting never blocks or fails the caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::state::ObservabilityCounters;

pub const OVERLAY_ADDED: i32 = 3001;
pub const OVERLAY_EDITED: i32 = 3002;
pub const OVERLAY_REMOVED: i32 = 3003;
pub const OVERLAYS_SAVED: i32 = 3004;
pub const OVERLAYS_REORDERED: i32 = 3005;
pub const VISITED_OVERLAY_SYNCED: i32 = 3006;

pub const TRIP_ADDED: i32 = 2001;
pub const TRIP_EDITED: i32 = 2002;
pub const TRIP_REMOVED: i32 = 2003;
pub const TRIPS_SAVED: i32 = 2004;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_code: i32,
    pub payload: serde_json::Value,
    pub user_id: String,
}

impl AuditEvent {
    pub fn new(event_code: i32, payload: serde_json::Value, user_id: impl Into<String>) -> Self {
        Self {
            event_code,
            payload,
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("audit write failed: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes every event as a structured tracing record.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "passport::audit",
            event_code = event.event_code,
            user_id = %event.user_id,
            payload = %event.payload,
            "activity"
        );
        Ok(())
    }
}

/// Appends events to `activity_log`.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        sqlx::query("INSERT INTO activity_log (user_id, event_code, payload) VALUES ($1, $2, $3)")
            .bind(&event.user_id)
            .bind(event.event_code)
            .bind(&event.payload)
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError(e.to_string()))?;
        Ok(())
    }
}

/// Fans one event out to several sinks; fails if any sink fails.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Handle used by the registries to emit events without awaiting them.
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
    observability: Arc<ObservabilityCounters>,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>, observability: Arc<ObservabilityCounters>) -> Self {
        Self {
            sink,
            observability,
        }
    }

    pub fn tracing_only(observability: Arc<ObservabilityCounters>) -> Self {
        Self::new(Arc::new(TracingAuditSink), observability)
    }

    /// Spawn the write. Failures are logged and counted, never returned.
    pub fn emit(&self, event: AuditEvent) {
        let sink = Arc::clone(&self.sink);
        let observability = Arc::clone(&self.observability);
        tokio::spawn(async move {
            if let Err(e) = sink.record(&event).await {
                observability.record_audit_failure();
                warn!(
                    error = %e,
                    event_code = event.event_code,
                    user_id = %event.user_id,
                    "failed to record activity"
                );
            }
        });
    }
}
