use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::warn;

use crate::config::SSE_KEEPALIVE_SECS;
use crate::routes::api::open_workspace;
use crate::services::timeline_player::TimelineFrame;
use crate::state::AppState;

/// Timeline frames for one owner. The first event is the current frame.
pub async fn timeline_events(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let workspace = open_workspace(&state, &owner).await?;
    let mut frames = WatchStream::new(workspace.timeline().subscribe());

    let stream = async_stream::stream! {
        // Keeps the workspace, and with it the player, alive while streaming.
        let _workspace = workspace;
        while let Some(frame) = frames.next().await {
            let Some(payload) = event_payload(&frame) else {
                continue;
            };
            yield Ok(
                Event::default()
                    .id(frame.timeline.selected_year.to_string())
                    .event("timeline")
                    .data(payload),
            );
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keep-alive"),
    ))
}

fn event_payload(frame: &TimelineFrame) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, "failed to serialize timeline frame; dropping SSE event");
            None
        }
    }
}
