use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use passport_shared::colors::parse_hex_color;
use passport_shared::{Overlay, OverlayRecord, Trip};
use serde::Deserialize;
use tracing::warn;

use crate::config::DEFAULT_MAP_FALLBACK_COLOR;
use crate::registry::RegistryError;
use crate::services::timeline_player::TimelineAction;
use crate::state::{AppState, ObservabilitySnapshot};
use crate::store::StoreError;
use crate::trips::TripError;
use crate::workspace::{Workspace, WorkspaceError};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "workspaces": state.workspaces.len(),
        "remote_store_available": state.db.is_some(),
        "observability": {
            "sync_writes_total": observability.sync_writes_total,
            "sync_skips_total": observability.sync_skips_total,
            "empty_save_rejections_total": observability.empty_save_rejections_total,
            "persist_failures_total": observability.persist_failures_total,
            "audit_failures_total": observability.audit_failures_total,
            "workspaces_opened_total": observability.workspaces_opened_total,
            "workspaces_evicted_total": observability.workspaces_evicted_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.workspaces.len(),
        state.db.is_some(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
    let _ = writeln!(body, "{name} {value}");
}

fn render_prometheus_metrics(
    open_workspaces: usize,
    remote_store_available: bool,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    write_metric(
        &mut body,
        "passport_workspaces_open",
        "gauge",
        "Current number of cached workspaces.",
        open_workspaces as u64,
    );
    write_metric(
        &mut body,
        "passport_remote_store_available",
        "gauge",
        "Whether the remote per-user store is configured (1 or 0).",
        u64::from(remote_store_available),
    );

    let counters = [
        (
            "passport_sync_writes_total",
            "Visited overlay syncs that persisted the collection.",
            observability.sync_writes_total,
        ),
        (
            "passport_sync_skips_total",
            "Visited overlay syncs skipped because nothing changed.",
            observability.sync_skips_total,
        ),
        (
            "passport_empty_save_rejections_total",
            "Overlay saves refused because the collection was empty.",
            observability.empty_save_rejections_total,
        ),
        (
            "passport_persist_failures_total",
            "Failures while persisting overlays.",
            observability.persist_failures_total,
        ),
        (
            "passport_audit_failures_total",
            "Activity log writes that failed.",
            observability.audit_failures_total,
        ),
        (
            "passport_workspaces_opened_total",
            "Workspaces opened since start-up.",
            observability.workspaces_opened_total,
        ),
        (
            "passport_workspaces_evicted_total",
            "Idle workspaces evicted since start-up.",
            observability.workspaces_evicted_total,
        ),
    ];
    for (name, help, value) in counters {
        write_metric(&mut body, name, "counter", help, value);
    }

    body
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_status(e: &WorkspaceError) -> StatusCode {
    match e {
        WorkspaceError::InvalidOwner(_) | WorkspaceError::Invalid(_) => StatusCode::BAD_REQUEST,
        WorkspaceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        WorkspaceError::Trips(e) => match e {
            TripError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            TripError::NotFound(_) => StatusCode::NOT_FOUND,
            TripError::AlreadyExists(_) => StatusCode::CONFLICT,
            TripError::Invalid(_) => StatusCode::BAD_REQUEST,
            TripError::Store(e) => store_status(e),
        },
        WorkspaceError::Overlays(e) => match e {
            RegistryError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::ReservedOverlay(_) => StatusCode::BAD_REQUEST,
            RegistryError::Duplicate(_) => StatusCode::CONFLICT,
            RegistryError::Store(e) => store_status(e),
        },
    }
}

fn reject(e: WorkspaceError) -> StatusCode {
    let status = error_status(&e);
    if status.is_server_error() {
        warn!(error = %e, status = status.as_u16(), "request failed");
    }
    status
}

pub(crate) async fn open_workspace(
    state: &AppState,
    owner: &str,
) -> Result<Arc<Workspace>, StatusCode> {
    state.workspace(owner).await.map_err(reject)
}

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapQuery {
    pub fallback: Option<String>,
    #[serde(default)]
    pub shade: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReorderBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ColorBody {
    pub color: String,
}

pub async fn list_trips(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.trips().await.map_err(reject)?))
}

pub async fn save_trips(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(trips): Json<Vec<Trip>>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.save_trips(trips).await.map_err(reject)?))
}

pub async fn add_trip(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(trip): Json<Trip>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    let added = workspace.add_trip(trip).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn edit_trip(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, String)>,
    Json(mut trip): Json<Trip>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    trip.id = id;
    Ok(Json(workspace.edit_trip(trip).await.map_err(reject)?))
}

pub async fn remove_trip(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.remove_trip(&id).await.map_err(reject)?))
}

pub async fn list_overlays(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    let overlays = workspace.overlays().await.map_err(reject)?;
    Ok(Json(serde_json::json!({
        "status": workspace.overlay_phase().await,
        "overlays": overlays,
    })))
}

pub async fn save_overlays(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(records): Json<Vec<OverlayRecord>>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    let overlays = records.into_iter().map(Overlay::from).collect();
    let outcome = workspace.save_overlays(overlays).await.map_err(reject)?;
    Ok(Json(serde_json::json!({
        "outcome": outcome,
        "overlays": workspace.overlays().await.map_err(reject)?,
    })))
}

pub async fn add_overlay(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(record): Json<OverlayRecord>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    let added = workspace
        .add_overlay(Overlay::from(record))
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn edit_overlay(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, String)>,
    Json(mut record): Json<OverlayRecord>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    record.id = id;
    let edited = workspace
        .edit_overlay(Overlay::from(record))
        .await
        .map_err(reject)?;
    Ok(Json(edited))
}

pub async fn remove_overlay(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.remove_overlay(&id).await.map_err(reject)?))
}

pub async fn reorder_overlays(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(body): Json<ReorderBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(
        workspace.reorder_overlays(&body.ids).await.map_err(reject)?,
    ))
}

pub async fn set_visited_color(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(body): Json<ColorBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    let outcome = workspace
        .set_visited_color(&body.color)
        .await
        .map_err(reject)?;
    Ok(Json(serde_json::json!({
        "outcome": outcome,
        "color": workspace.visited_color().await,
    })))
}

pub async fn visited(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.visited(query.year).await.map_err(reject)?))
}

pub async fn country_visits(
    State(state): State<AppState>,
    Path((owner, iso_code)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(
        workspace
            .country_visits(&iso_code)
            .await
            .map_err(reject)?,
    ))
}

pub async fn visit_counts(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(
        workspace.visit_counts(query.year).await.map_err(reject)?,
    ))
}

pub async fn upcoming(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.upcoming().await.map_err(reject)?))
}

pub async fn years(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.years().await.map_err(reject)?))
}

pub async fn map(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<MapQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let fallback = query
        .fallback
        .as_deref()
        .map(str::trim)
        .unwrap_or(DEFAULT_MAP_FALLBACK_COLOR);
    if parse_hex_color(fallback).is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(
        workspace.map(fallback, query.shade).await.map_err(reject)?,
    ))
}

pub async fn timeline(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.timeline().frame()))
}

pub async fn timeline_action(
    State(state): State<AppState>,
    Path((owner, action)): Path<(String, String)>,
    Query(query): Query<YearQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let action = TimelineAction::parse(&action, query.year).ok_or(StatusCode::BAD_REQUEST)?;
    let workspace = open_workspace(&state, &owner).await?;
    Ok(Json(workspace.timeline().perform(action).await))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Datelike;
    use tower::ServiceExt;

    use super::render_prometheus_metrics;
    use crate::config::Settings;
    use crate::state::{AppState, ObservabilitySnapshot};

    fn guest_state(dir: &tempfile::TempDir) -> AppState {
        AppState::new(
            None,
            Settings {
                data_dir: dir.path().to_path_buf(),
                ..Settings::default()
            },
        )
    }

    async fn spawn_test_server(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    #[test]
    fn metrics_output_contains_prometheus_help_type_and_values() {
        let observability = ObservabilitySnapshot {
            sync_writes_total: 12,
            sync_skips_total: 30,
            empty_save_rejections_total: 1,
            persist_failures_total: 3,
            audit_failures_total: 2,
            workspaces_opened_total: 5,
            workspaces_evicted_total: 4,
        };

        let metrics = render_prometheus_metrics(1, true, observability);

        assert!(metrics.contains("# HELP passport_workspaces_open"));
        assert!(metrics.contains("# TYPE passport_sync_writes_total counter"));
        assert!(metrics.contains("passport_workspaces_open 1"));
        assert!(metrics.contains("passport_remote_store_available 1"));
        assert!(metrics.contains("passport_sync_writes_total 12"));
        assert!(metrics.contains("passport_sync_skips_total 30"));
        assert!(metrics.contains("passport_empty_save_rejections_total 1"));
        assert!(metrics.contains("passport_persist_failures_total 3"));
        assert!(metrics.contains("passport_audit_failures_total 2"));
        assert!(metrics.contains("passport_workspaces_opened_total 5"));
        assert!(metrics.contains("passport_workspaces_evicted_total 4"));
    }

    #[tokio::test]
    async fn health_and_metrics_expose_expected_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (addr, server_handle) = spawn_test_server(guest_state(&dir)).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        client
            .get(format!("{base_url}/api/guest/trips"))
            .send()
            .await
            .expect("trips request")
            .error_for_status()
            .expect("trips status");

        let health = client
            .get(format!("{base_url}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("parse health");

        assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(
            health.get("remote_store_available").and_then(|v| v.as_bool()),
            Some(false)
        );
        assert_eq!(health.get("workspaces").and_then(|v| v.as_u64()), Some(1));

        let metrics = client
            .get(format!("{base_url}/api/metrics"))
            .send()
            .await
            .expect("metrics request")
            .error_for_status()
            .expect("metrics status")
            .text()
            .await
            .expect("parse metrics text");

        assert!(metrics.contains("# TYPE passport_workspaces_opened_total counter"));
        assert!(metrics.contains("passport_workspaces_opened_total 1"));
        assert!(metrics.contains("passport_remote_store_available 0"));

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn guest_trip_flow_updates_visited_overlay_and_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (addr, server_handle) = spawn_test_server(guest_state(&dir)).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();
        let year = chrono::Utc::now().year() - 2;

        let response = client
            .post(format!("{base_url}/api/guest/trips"))
            .json(&serde_json::json!({
                "id": "t1",
                "name": "Spring",
                "countryCodes": ["fr", "de"],
                "startDate": format!("{year}-04-01"),
                "endDate": format!("{year}-04-12"),
                "status": "planned",
            }))
            .send()
            .await
            .expect("add trip");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let trip: serde_json::Value = response.json().await.expect("trip body");
        assert_eq!(trip["status"], "completed");
        assert_eq!(trip["countryCodes"], serde_json::json!(["FR", "DE"]));

        let overlays: serde_json::Value = client
            .get(format!("{base_url}/api/guest/overlays"))
            .send()
            .await
            .expect("overlays request")
            .json()
            .await
            .expect("overlays body");
        assert_eq!(overlays["status"]["phase"], "ready");
        assert_eq!(
            overlays["overlays"][0]["countries"],
            serde_json::json!(["FR", "DE"])
        );
        assert!(dir.path().join("guest").join("overlays.json").exists());

        let added = client
            .post(format!("{base_url}/api/guest/overlays"))
            .json(&serde_json::json!({
                "id": "w1",
                "name": "Wishlist",
                "color": "#0000ff",
                "countries": ["BR", "FR"],
            }))
            .send()
            .await
            .expect("add overlay");
        assert_eq!(added.status(), reqwest::StatusCode::CREATED);

        let map: serde_json::Value = client
            .get(format!("{base_url}/api/guest/map"))
            .send()
            .await
            .expect("map request")
            .json()
            .await
            .expect("map body");
        assert_eq!(map["BR"]["color"], "#0000ff");
        assert_eq!(map["FR"]["color"], "#4caf50");
        assert_eq!(map["FR"]["tooltip"], "Visited Countries, Wishlist");

        let years: Vec<i32> = client
            .get(format!("{base_url}/api/guest/years"))
            .send()
            .await
            .expect("years request")
            .json()
            .await
            .expect("years body");
        assert_eq!(years, vec![year]);

        let visits: serde_json::Value = client
            .get(format!("{base_url}/api/guest/visits/de"))
            .send()
            .await
            .expect("visits request")
            .json()
            .await
            .expect("visits body");
        assert_eq!(visits["isoCode"], "DE");
        assert_eq!(visits["past"][0]["tripName"], "Spring");

        let frame: serde_json::Value = client
            .post(format!("{base_url}/api/guest/timeline/enable"))
            .send()
            .await
            .expect("timeline request")
            .json()
            .await
            .expect("timeline body");
        assert_eq!(frame["enabled"], true);
        assert_eq!(frame["selectedYear"], year);
        assert_eq!(frame["highlight"]["countries"], serde_json::json!(["FR", "DE"]));

        let missing = client
            .delete(format!("{base_url}/api/guest/trips/nope"))
            .send()
            .await
            .expect("delete missing trip");
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let reserved = client
            .delete(format!("{base_url}/api/guest/overlays/visited-countries"))
            .send()
            .await
            .expect("delete visited overlay");
        assert_eq!(reserved.status(), reqwest::StatusCode::BAD_REQUEST);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn rejects_bad_requests_before_touching_stores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = crate::app::build_app(guest_state(&dir));

        let cases = [
            ("POST", "/api/guest/timeline/rewind", StatusCode::BAD_REQUEST),
            ("POST", "/api/guest/timeline/select", StatusCode::BAD_REQUEST),
            ("GET", "/api/guest/map?fallback=grey", StatusCode::BAD_REQUEST),
            ("GET", "/api/user-1/trips", StatusCode::SERVICE_UNAVAILABLE),
            ("GET", "/api/..%2Fetc/trips", StatusCode::BAD_REQUEST),
        ];
        for (method, uri, expected) in cases {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .expect("build request"),
                )
                .await
                .expect("route request");
            assert_eq!(response.status(), expected, "{method} {uri}");
        }
        assert!(!dir.path().join("guest").exists());
    }
}
