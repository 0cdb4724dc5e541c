use std::collections::HashSet;

use sqlx::migrate::{MigrateError, MigrationType, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// What one `run_pending` call did to the schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub newly_applied: Vec<AppliedMigration>,
    pub previously_applied: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
}

pub async fn run_pending(pool: &DbPool) -> Result<MigrationReport, MigrateError> {
    let before = applied_versions(pool).await;
    MIGRATOR.run(pool).await?;

    let newly_applied = MIGRATOR
        .iter()
        .filter(|migration| !matches!(migration.migration_type, MigrationType::ReversibleDown))
        .filter(|migration| !before.contains(&migration.version))
        .map(|migration| AppliedMigration {
            version: migration.version,
            description: migration.description.to_string(),
        })
        .collect();

    Ok(MigrationReport { newly_applied, previously_applied: before.len() })
}

/// The bookkeeping table does not exist before the first run; that reads as
/// nothing applied yet.
async fn applied_versions(pool: &DbPool) -> HashSet<i64> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations")
        .fetch_all(pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .collect()
}
