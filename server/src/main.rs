mod app;
mod audit;
mod config;
mod db_migrations;
mod db_sqlx;
mod registry;
mod routes;
mod services;
mod state;
mod store;
mod trips;
mod workspace;

extern crate self as sqlx;
pub use crate::db_sqlx::{Error, PgPool, postgres, query, query_as, query_scalar};

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::state::AppState;

/// Connect and migrate when DATABASE_URL is set. Without it only guest
/// workspaces are served.
async fn connect_database() -> Result<Option<PgPool>, String> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL is not set; only guest workspaces are available");
        return Ok(None);
    };
    let db_max_connections = config::db_max_connections();
    tracing::info!(db_max_connections, "Connecting to PostgreSQL...");
    let db = PgPoolOptions::new()
        .max_connections(db_max_connections)
        .connect(&database_url)
        .await
        .map_err(|e| format!("failed to connect to PostgreSQL: {e}"))?;
    db_migrations::run(&db)
        .await
        .map_err(|e| format!("failed to run migrations: {e}"))?;
    tracing::info!("Database connected and migrations applied");
    Ok(Some(db))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let db = match connect_database().await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "database start-up failed");
            return;
        }
    };

    let settings = Settings::from_env();
    tracing::info!(
        data_dir = %settings.data_dir.display(),
        visited_color = %settings.visited_color,
        home_country = ?settings.home_country,
        "Loaded settings"
    );
    let state = AppState::new(db, settings);

    // Spawn background services
    tokio::spawn(services::workspace_evictor::run(state.clone()));
    tokio::spawn(services::retention_cleaner::run(state.clone()));

    let app = app::build_app(state.clone());

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("Passport server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    for workspace in state.workspaces.iter() {
        workspace.close();
    }
    tracing::info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
