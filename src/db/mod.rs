pub mod accounts;
pub mod models;
pub mod posts;

use anyhow::Context;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);
    let pool = Pool::builder().max_size(8).build(manager)?;

    Ok(pool)
}

/// Per-connection settings. `foreign_keys` and the busy timeout are not
/// persisted in the file, so every pooled connection applies them.
fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )
}

/// Apply every migration not yet listed in `schema_version`. Each script and
/// its version row commit together, so a failed script leaves no trace.
pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0;
    for (name, sql) in MIGRATIONS {
        let tx = conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM schema_version WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            continue;
        }

        tracing::info!("Applying migration: {}", name);
        tx.execute_batch(sql)
            .with_context(|| format!("migration {} failed", name))?;
        tx.execute(
            "INSERT INTO schema_version (name, applied_at) VALUES (?1, ?2)",
            params![name, now_timestamp()],
        )?;
        tx.commit()?;
        applied += 1;
    }

    tracing::info!("Database migrations complete ({} applied)", applied);
    Ok(())
}

/// Current UTC time in the format stored in every timestamp column.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    run_migrations(&pool).unwrap();
    pool
}
