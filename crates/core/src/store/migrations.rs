//! Database schema migrations.
//!
//! Uses a simple version table approach to track applied migrations.
//! Each migration is a SQL batch that creates missing collections; data in
//! collections that already exist is never touched.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, SQL).
///
/// Migrations must be applied in order. The highest version is the
/// schema version this build declares.
pub(crate) const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_favorites.sql")),
    (2, include_str!("../../migrations/002_pending_writes.sql")),
    (3, include_str!("../../migrations/003_cache_generations.sql")),
    (4, include_str!("../../migrations/004_push_subscription.sql")),
];

/// Schema version declared by this build.
pub fn declared_version() -> i64 {
    MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0)
}

/// Run any pending migrations.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` if a migration SQL fails to execute or
/// the database was written by a newer schema than this build knows.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    apply(conn, MIGRATIONS).await
}

/// Apply `migrations` on top of whatever version is recorded on disk.
///
/// Each version runs in its own transaction together with its bookkeeping row,
/// so a failed upgrade leaves the previous version intact.
pub(crate) async fn apply(conn: &Connection, migrations: &'static [(i64, &'static str)]) -> Result<(), Error> {
    conn.call(move |conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        let declared = migrations.last().map(|(v, _)| *v).unwrap_or(0);
        if current > declared {
            return Err(Error::MigrationFailed(format!(
                "database is at version {current}, newer than supported version {declared}"
            )));
        }

        for (version, sql) in migrations {
            if *version <= current {
                continue;
            }

            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;

            tracing::info!(version, "applied store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
