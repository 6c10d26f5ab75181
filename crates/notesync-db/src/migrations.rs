//! # Database Migrations
//!
//! Embedded SQL migrations for the sync store.
//!
//! ## Schema Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 One table per synchronizable kind                       │
//! │                                                                         │
//! │  notes, notebooks, shortcuts, relations, reminders, content,           │
//! │  settings, attachments, user_settings, monographs                      │
//! │                                                                         │
//! │  ┌───────────────┬───────────────────────────────────────────────┐     │
//! │  │ user_id       │ owner                                          │     │
//! │  │ id            │ client id, CHECK(length(id) > 0)               │     │
//! │  │ payload       │ opaque client payload                          │     │
//! │  │ date_modified │ client clock (unix ms)                         │     │
//! │  │ date_synced   │ server clock (unix ms), fetch cursor           │     │
//! │  │ deleted       │ tombstone flag                                 │     │
//! │  └───────────────┴───────────────────────────────────────────────┘     │
//! │  PRIMARY KEY (user_id, id), INDEX (user_id, date_synced)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no cross-table schema; atomicity across kinds comes from the
//! unit of work, not from foreign keys.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql`
//! 3. **NEVER** modify existing migrations - always add new ones

use notesync_core::EntityKind;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Each migration runs in its own transaction, in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)`.
///
/// A database that was never migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}

/// Highest `date_synced` across every collection, 0 for an empty store.
pub async fn latest_date_synced(pool: &SqlitePool) -> DbResult<i64> {
    let per_table: Vec<String> = EntityKind::ALL
        .iter()
        .map(|kind| format!("SELECT MAX(date_synced) AS stamp FROM {}", kind.collection()))
        .collect();
    let sql = format!(
        "SELECT COALESCE(MAX(stamp), 0) FROM ({})",
        per_table.join(" UNION ALL ")
    );

    let latest: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(latest)
}
