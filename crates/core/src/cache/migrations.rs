//! Schema migrations for the cache database.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its bookkeeping row, so a
//! failed migration leaves the schema at the previous version.

use tokio_rusqlite::{Connection, params, rusqlite};

use super::Error;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. SQL uses `IF NOT EXISTS` throughout.
const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "cache_stores", sql: include_str!("../../migrations/001_cache_stores.sql") },
    Migration { version: 2, name: "cache_entries", sql: include_str!("../../migrations/002_cache_entries.sql") },
];

fn applied_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )?;
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    Ok(version)
}

fn apply(conn: &mut rusqlite::Connection, migration: &Migration) -> Result<(), Error> {
    let fail = |e: rusqlite::Error| Error::MigrationFailed(format!("v{} {}: {e}", migration.version, migration.name));

    let tx = conn.transaction().map_err(fail)?;
    tx.execute_batch(migration.sql).map_err(fail)?;
    tx.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(fail)?;
    tx.commit().map_err(fail)
}

/// Bring the schema up to the latest version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the migration whose SQL failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current = applied_version(conn)?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            apply(conn, migration)?;
            tracing::debug!(version = migration.version, name = migration.name, "applied cache migration");
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}
