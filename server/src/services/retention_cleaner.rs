use std::time::Duration;

use tracing::{info, warn};

use crate::config::{RETENTION_CHECK_SECS, audit_retention_days};
use crate::state::AppState;

const BATCH_SIZE: i64 = 10_000;

/// Daily cleanup of activity log rows beyond the retention period.
pub async fn run(state: AppState) {
    let Some(pool) = state.db.as_ref().cloned() else {
        warn!("retention cleaner disabled: no database configured");
        return;
    };
    let retention_days = audit_retention_days();

    info!(
        "Retention cleaner started (retention: {}d, check interval: {}s)",
        retention_days, RETENTION_CHECK_SECS
    );

    run_cleanup_once(&pool, retention_days).await;

    let mut interval = tokio::time::interval(Duration::from_secs(RETENTION_CHECK_SECS));
    // Consume immediate tick so subsequent cleanup runs after the configured interval.
    interval.tick().await;

    loop {
        interval.tick().await;
        run_cleanup_once(&pool, retention_days).await;
    }
}

async fn run_cleanup_once(pool: &sqlx::PgPool, retention_days: i64) -> i64 {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);

    // Batches keep each delete's lock short.
    let mut total = 0i64;
    loop {
        match sqlx::query(
            "DELETE FROM activity_log WHERE id IN \
             (SELECT id FROM activity_log WHERE recorded_at < $1 LIMIT $2)",
        )
        .bind(cutoff)
        .bind(BATCH_SIZE)
        .execute(pool)
        .await
        {
            Ok(result) => {
                let deleted = result.rows_affected() as i64;
                total += deleted;
                if deleted < BATCH_SIZE {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to delete old activity log rows: {e}");
                break;
            }
        }
    }

    if total > 0 {
        info!("Retention cleanup: removed {total} activity log rows older than {retention_days}d");
    }
    total
}
