//! Versioned schema migrations.
//!
//! Each migration is a static SQL batch with a version number. Applied
//! versions are recorded in `_migrations`, so running the set again is a
//! no-op.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// Append new migrations at the end; never edit an applied one.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "run records",
        sql: r#"
            CREATE TABLE runs (
                run_id      TEXT PRIMARY KEY,
                document    TEXT NOT NULL,
                status      TEXT NOT NULL CHECK(status IN ('success','parse_error','processing_error')),
                message     TEXT,
                report      TEXT NOT NULL,
                started_at  INTEGER NOT NULL,
                finished_at INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "run lookup indexes",
        sql: r#"
            CREATE INDEX idx_runs_finished ON runs(finished_at DESC);
            CREATE INDEX idx_runs_status ON runs(status);
        "#,
    },
];

/// Apply every migration newer than the database's current version.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!(current_version = current, "run schema is up to date");
        return Ok(());
    }

    info!(current_version = current, pending = pending.len(), "migrating run schema");
    for migration in pending {
        apply(conn, migration)?;
    }
    Ok(())
}

/// The latest applied version, or 0 for a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
        row.get(0)
    })
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to read current version: {e}"),
    })
}

/// The version the schema reaches once every migration is applied.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })
}

/// Apply one migration in its own transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let fail = |stage: &str, e: rusqlite::Error| StoreError::Migration {
        version: migration.version,
        message: format!("{stage}: {e}"),
    };

    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| fail("begin", e))?;

    let result = conn
        .execute_batch(migration.sql)
        .map_err(|e| fail("sql", e))
        .and_then(|()| {
            conn.execute(
                "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().timestamp()
                ],
            )
            .map(|_| ())
            .map_err(|e| fail("record", e))
        });

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;").map_err(|e| fail("commit", e))?;
            info!(
                version = migration.version,
                description = migration.description,
                "migration applied"
            );
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }
    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_strictly_ordered() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
        assert_eq!(MIGRATIONS[0].version, 1);
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn runs_table_rejects_unknown_status() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        let err = conn.execute(
            "INSERT INTO runs (run_id, document, status, report, started_at, finished_at)
             VALUES ('r', 'd', 'done', '{}', 0, 0)",
            [],
        );
        assert!(err.is_err());
    }
}
