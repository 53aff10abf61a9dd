use crate::conv::text_to_json;
use crate::error::StorageResult;
use crate::records::SkillRun;
use argentor_core::{SkillRunId, TaskId};
use rusqlite::{params, Connection, OptionalExtension};

const SELECT_COLUMNS: &str = "skill_run_id, task_id, skill_name, idempotency_key, input_hash, \
     status, output_json, error_code, started_at, finished_at";

pub fn insert(conn: &Connection, run: &SkillRun) -> StorageResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO skill_runs ({SELECT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"
        ),
        params![
            run.skill_run_id.to_string(),
            run.task_id.to_string(),
            run.skill_name,
            run.idempotency_key,
            run.input_hash,
            run.status,
            run.output_json.as_ref().map(serde_json::to_string).transpose()?,
            run.error_code,
            run.started_at.to_rfc3339(),
            run.finished_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

/// A cached successful run for this skill + idempotency key, if one exists.
pub fn find_cached_success(
    conn: &Connection,
    skill_name: &str,
    idempotency_key: &str,
) -> StorageResult<Option<SkillRun>> {
    conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM skill_runs \
             WHERE skill_name = ?1 AND idempotency_key = ?2 AND status = 'SUCCEEDED' \
             ORDER BY started_at DESC LIMIT 1"
        ),
        params![skill_name, idempotency_key],
        row_to_run,
    )
    .optional()
    .map_err(crate::error::StorageError::from)
}

pub fn list_for_task(conn: &Connection, task_id: TaskId) -> StorageResult<Vec<SkillRun>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM skill_runs WHERE task_id = ?1 ORDER BY started_at"))?;
    let rows = stmt.query_map([task_id.to_string()], row_to_run)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<SkillRun> {
    let skill_run_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let output_json: Option<String> = row.get(6)?;
    let started_at: String = row.get(8)?;
    let finished_at: Option<String> = row.get(9)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(SkillRun {
        skill_run_id: SkillRunId::parse(&skill_run_id).map_err(|e| invalid(0, e.to_string()))?,
        task_id: TaskId::parse(&task_id).map_err(|e| invalid(1, e.to_string()))?,
        skill_name: row.get(2)?,
        idempotency_key: row.get(3)?,
        input_hash: row.get(4)?,
        status: row.get(5)?,
        output_json: output_json.map(|s| text_to_json(&s, "output_json")).transpose().map_err(|e| invalid(6, e.to_string()))?,
        error_code: row.get(7)?,
        started_at: argentor_core::parse_iso8601(&started_at).map_err(|e| invalid(8, e.to_string()))?,
        finished_at: finished_at.map(|s| argentor_core::parse_iso8601(&s)).transpose().map_err(|e| invalid(9, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{NodeType, Owner, PlanId};
    use argentor_graph::{Constraints, TaskNode};

    fn seeded_task(conn: &Connection) -> TaskId {
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
        let node = TaskNode::new(plan_id, NodeType::Action, "extract text", Owner::Executor);
        crate::repo::task_nodes::insert(conn, &node).unwrap();
        node.task_id
    }

    fn sample_run(task_id: TaskId, idempotency_key: &str, status: &str) -> SkillRun {
        SkillRun {
            skill_run_id: SkillRunId::new(),
            task_id,
            skill_name: "text_extract".into(),
            idempotency_key: Some(idempotency_key.into()),
            input_hash: Some("deadbeef".into()),
            status: status.into(),
            output_json: Some(serde_json::json!({"artifacts": []})),
            error_code: None,
            started_at: argentor_core::utc_now(),
            finished_at: Some(argentor_core::utc_now()),
        }
    }

    #[test]
    fn finds_cached_success_by_idempotency_key() {
        let conn = crate::connection::open_in_memory().unwrap();
        let task_id = seeded_task(&conn);
        insert(&conn, &sample_run(task_id, "key-1", "SUCCEEDED")).unwrap();

        let cached = find_cached_success(&conn, "text_extract", "key-1").unwrap();
        assert!(cached.is_some());

        let miss = find_cached_success(&conn, "text_extract", "key-2").unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn failed_runs_are_not_returned_as_cached_success() {
        let conn = crate::connection::open_in_memory().unwrap();
        let task_id = seeded_task(&conn);
        insert(&conn, &sample_run(task_id, "key-1", "FAILED")).unwrap();

        assert!(find_cached_success(&conn, "text_extract", "key-1").unwrap().is_none());
    }
}
