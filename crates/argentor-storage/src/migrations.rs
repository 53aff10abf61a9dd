//! A filename-ledger migration runner.
//!
//! Grounded on `core/db.py`'s `apply_migrations()`: each `.sql` file under
//! `migrations/` is applied at most once, tracked by filename (not a
//! numeric `user_version`) in a `schema_migrations` table. Re-running a
//! migration that has already partially applied is tolerated: SQLite errors
//! whose message indicates the object already exists (duplicate column,
//! duplicate index, table/index already exists) are swallowed rather than
//! aborting the run, so migrations stay idempotent across restarts that
//! crashed mid-apply.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use tracing::{info, warn};

struct Migration {
    filename: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    filename: "0001_init.sql",
    sql: include_str!("../migrations/0001_init.sql"),
}];

fn is_benign_rerun_error(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("duplicate column name")
        || m.contains("already exists")
        || m.contains("index") && m.contains("already")
}

/// Applies every migration not yet recorded in `schema_migrations`, in
/// declaration order, each inside its own transaction.
pub fn run(conn: &mut Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            filename TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    for migration in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE filename = ?1)",
            [migration.filename],
            |row| row.get(0),
        )?;
        if already_applied {
            continue;
        }

        let tx = conn.transaction()?;
        match tx.execute_batch(migration.sql) {
            Ok(()) => {}
            Err(rusqlite::Error::SqliteFailure(_, Some(ref message)))
                if is_benign_rerun_error(message) =>
            {
                warn!(filename = migration.filename, message = %message, "tolerating benign rerun error");
            }
            Err(other) => {
                return Err(StorageError::Migration {
                    filename: migration.filename.to_string(),
                    reason: other.to_string(),
                });
            }
        }
        tx.execute(
            "INSERT INTO schema_migrations (filename, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.filename, argentor_core::utc_now_iso()],
        )?;
        tx.commit()?;
        info!(filename = migration.filename, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_migrations_exactly_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        let count_before: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        run(&mut conn).unwrap();
        let count_after: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count_before, count_after);
        assert_eq!(count_before, MIGRATIONS.len() as i64);
    }

    #[test]
    fn creates_expected_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='task_nodes')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(exists);
    }
}
