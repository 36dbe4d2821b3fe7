use std::path::Path;

use tracing::info;

const WORKSPACE_MIGRATIONS_DIR: &str = "server/migrations";
const CRATE_MIGRATIONS_DIR: &str = "./migrations";

fn migrations_path() -> &'static Path {
    let workspace_path = Path::new(WORKSPACE_MIGRATIONS_DIR);
    if workspace_path.exists() {
        return workspace_path;
    }
    Path::new(CRATE_MIGRATIONS_DIR)
}

/// Apply pending migrations for the document store and the activity log.
pub async fn run(pool: &sqlx::PgPool) -> Result<(), sqlx_core::migrate::MigrateError> {
    let path = migrations_path();
    let migrator = sqlx_core::migrate::Migrator::new(path).await?;
    info!(
        path = %path.display(),
        migrations = migrator.iter().count(),
        "applying migrations"
    );
    migrator.run(pool).await
}
