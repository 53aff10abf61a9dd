//! `task_error_counters` repository (spec §2 "Error counters"). Grounded
//! on `core/error_counters.py`'s `increment_counter`/`get_counter`: an
//! upsert that bumps `count` and `last_seen_at` on conflict.

use crate::error::StorageResult;
use crate::records::ErrorCounter;
use argentor_core::TaskId;
use rusqlite::{params, OptionalExtension};

/// Increments `(task_id, error_code)`'s counter, inserting a fresh row at
/// `count = 1` if none exists yet. Returns the counter's new value.
pub fn increment(conn: &rusqlite::Connection, task_id: TaskId, error_code: &str, now: chrono::DateTime<chrono::Utc>) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO task_error_counters (task_id, error_code, count, last_seen_at) \
         VALUES (?1, ?2, 1, ?3) \
         ON CONFLICT(task_id, error_code) DO UPDATE SET count = count + 1, last_seen_at = excluded.last_seen_at",
        params![task_id.to_string(), error_code, now.to_rfc3339()],
    )?;
    get(conn, task_id, error_code).map(|c| c.unwrap_or(0))
}

/// The current count for `(task_id, error_code)`, or `None` if it has
/// never occurred.
pub fn get(conn: &rusqlite::Connection, task_id: TaskId, error_code: &str) -> StorageResult<Option<i64>> {
    conn.query_row(
        "SELECT count FROM task_error_counters WHERE task_id = ?1 AND error_code = ?2",
        params![task_id.to_string(), error_code],
        |row| row.get(0),
    )
    .optional()
    .map_err(crate::error::StorageError::from)
}

/// Clears `(task_id, error_code)`'s counter. Used by `reset-to-plan` when
/// reverting a task back to its freshly-planned state.
pub fn reset(conn: &rusqlite::Connection, task_id: TaskId, error_code: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM task_error_counters WHERE task_id = ?1 AND error_code = ?2",
        params![task_id.to_string(), error_code],
    )?;
    Ok(())
}

/// Clears every counter recorded against `task_id`.
pub fn reset_all_for_task(conn: &rusqlite::Connection, task_id: TaskId) -> StorageResult<()> {
    conn.execute("DELETE FROM task_error_counters WHERE task_id = ?1", params![task_id.to_string()])?;
    Ok(())
}

/// Every error code this task has hit, most-recently-seen first.
pub fn list_for_task(conn: &rusqlite::Connection, task_id: TaskId) -> StorageResult<Vec<ErrorCounter>> {
    let mut stmt = conn.prepare(
        "SELECT task_id, error_code, count, last_seen_at FROM task_error_counters \
         WHERE task_id = ?1 ORDER BY last_seen_at DESC",
    )?;
    let rows = stmt.query_map(params![task_id.to_string()], row_to_counter)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_counter(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorCounter> {
    let task_id: String = row.get(0)?;
    let last_seen_at: String = row.get(3)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(ErrorCounter {
        task_id: TaskId::parse(&task_id).map_err(|e| invalid(0, e.to_string()))?,
        error_code: row.get(1)?,
        count: row.get(2)?,
        last_seen_at: argentor_core::parse_iso8601(&last_seen_at).map_err(|e| invalid(3, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{utc_now, NodeType, Owner, PlanId};
    use argentor_graph::{Constraints, TaskNode};

    fn seeded_task(conn: &rusqlite::Connection) -> TaskId {
        let plan_id = PlanId::new();
        crate::repo::plans::insert(
            conn,
            &argentor_graph::Plan {
                plan_id,
                title: "p".into(),
                owner: Owner::Executor,
                root_task_id: TaskId::new(),
                created_at: argentor_core::utc_now(),
                constraints: Constraints { deadline: None, priority: argentor_core::Priority::Low },
            },
        )
        .unwrap();
        let node = TaskNode::new(plan_id, NodeType::Action, "do it", Owner::Executor);
        crate::repo::task_nodes::insert(conn, &node).unwrap();
        node.task_id
    }

    #[test]
    fn increment_starts_at_one_and_accumulates() {
        let conn = crate::connection::open_in_memory().unwrap();
        let task_id = seeded_task(&conn);

        let now = utc_now();
        assert_eq!(increment(&conn, task_id, "LLM_TIMEOUT", now).unwrap(), 1);
        assert_eq!(increment(&conn, task_id, "LLM_TIMEOUT", now).unwrap(), 2);
        assert_eq!(increment(&conn, task_id, "SKILL_FAILED", now).unwrap(), 1);

        assert_eq!(get(&conn, task_id, "LLM_TIMEOUT").unwrap(), Some(2));
        assert_eq!(get(&conn, task_id, "MISSING").unwrap(), None);

        let all = list_for_task(&conn, task_id).unwrap();
        assert_eq!(all.len(), 2);
    }
}
