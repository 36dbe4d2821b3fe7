use axum::Router;
use axum::routing::{get, post, put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::routes::{api, sse};
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    let owner_routes = Router::new()
        .route(
            "/trips",
            get(api::list_trips).put(api::save_trips).post(api::add_trip),
        )
        .route(
            "/trips/{id}",
            put(api::edit_trip).delete(api::remove_trip),
        )
        .route(
            "/overlays",
            get(api::list_overlays)
                .put(api::save_overlays)
                .post(api::add_overlay),
        )
        .route("/overlays/reorder", post(api::reorder_overlays))
        .route(
            "/overlays/{id}",
            put(api::edit_overlay).delete(api::remove_overlay),
        )
        .route("/settings/visited-color", put(api::set_visited_color))
        .route("/visited", get(api::visited))
        .route("/visits/{iso}", get(api::country_visits))
        .route("/visit-counts", get(api::visit_counts))
        .route("/upcoming", get(api::upcoming))
        .route("/years", get(api::years))
        .route("/map", get(api::map))
        .route("/timeline", get(api::timeline))
        .route("/timeline/events", get(sse::timeline_events))
        .route("/timeline/{action}", post(api::timeline_action));

    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/metrics", get(api::metrics))
        .nest("/api/{owner}", owner_routes)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::build_app;
    use crate::config::Settings;
    use crate::state::AppState;

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_app(AppState::new(
            None,
            Settings {
                data_dir: dir.path().to_path_buf(),
                ..Settings::default()
            },
        ));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/guest/nothing-here")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("route request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
