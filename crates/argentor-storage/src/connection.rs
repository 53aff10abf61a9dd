//! Connection setup: pragmas and migration bootstrap (`core/db.py`'s
//! `get_connection()` equivalent).

use crate::error::StorageResult;
use crate::migrations;
use rusqlite::Connection;
use std::path::Path;

/// Opens (creating if absent) the SQLite database at `path`, applies the
/// durability pragmas the original relies on, and runs pending migrations.
pub fn open(path: impl AsRef<Path>) -> StorageResult<Connection> {
    let mut conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

/// Opens an in-memory database, mainly for tests.
pub fn open_in_memory() -> StorageResult<Connection> {
    let mut conn = Connection::open_in_memory()?;
    apply_pragmas(&conn)?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_with_migrations_applied() {
        let conn = open_in_memory().unwrap();
        let foreign_keys: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(foreign_keys, 1);
    }
}
