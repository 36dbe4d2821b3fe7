use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::EVICTION_INTERVAL_SECS;
use crate::state::AppState;

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(EVICTION_INTERVAL_SECS));

    loop {
        interval.tick().await;
        evict_idle(&state);
    }
}

/// Drop workspaces idle for at least the configured TTL, stopping their
/// timers. Returns how many were evicted.
pub(crate) fn evict_idle(state: &AppState) -> usize {
    let ttl = state.settings.workspace_idle_ttl;
    let now = Utc::now();
    let mut evicted = Vec::new();

    state.workspaces.retain(|_, workspace| {
        if workspace.idle_for(now) < ttl {
            return true;
        }
        evicted.push(workspace.clone());
        false
    });

    for workspace in &evicted {
        workspace.close();
    }
    if !evicted.is_empty() {
        state
            .observability
            .record_workspaces_evicted(evicted.len() as u64);
        info!(
            "evicted {} idle workspaces ({} remaining)",
            evicted.len(),
            state.workspaces.len()
        );
    }
    evicted.len()
}
