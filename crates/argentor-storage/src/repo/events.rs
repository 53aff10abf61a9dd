use crate::conv::{json_to_text, text_to_json};
use crate::error::StorageResult;
use argentor_core::{EventId, PlanId, TaskId};
use crate::records::TaskEvent;
use rusqlite::{params, Connection};

pub fn insert(conn: &Connection, event: &TaskEvent) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO task_events (event_id, plan_id, task_id, event_type, payload_json, created_at)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            event.event_id.to_string(),
            event.plan_id.to_string(),
            event.task_id.map(|id| id.to_string()),
            event.event_type,
            json_to_text(&event.payload)?,
            event.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_for_plan(conn: &Connection, plan_id: PlanId) -> StorageResult<Vec<TaskEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, plan_id, task_id, event_type, payload_json, created_at
         FROM task_events WHERE plan_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map([plan_id.to_string()], row_to_event)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskEvent> {
    let event_id: String = row.get(0)?;
    let plan_id: String = row.get(1)?;
    let task_id: Option<String> = row.get(2)?;
    let payload_json: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(TaskEvent {
        event_id: EventId::parse(&event_id).map_err(|e| invalid(0, e.to_string()))?,
        plan_id: PlanId::parse(&plan_id).map_err(|e| invalid(1, e.to_string()))?,
        task_id: task_id.map(|s| TaskId::parse(&s)).transpose().map_err(|e| invalid(2, e.to_string()))?,
        event_type: row.get(3)?,
        payload: text_to_json(&payload_json, "payload_json").map_err(|e| invalid(4, e.to_string()))?,
        created_at: argentor_core::parse_iso8601(&created_at).map_err(|e| invalid(5, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::Owner;
    use serde_json::json;

    #[test]
    fn records_and_lists_events_in_order() {
        let conn = crate::connection::open_in_memory().unwrap();
        let plan_id = PlanId::new();
        super::super::plans::insert(
            &conn,
            &argentor_graph::Plan {
                plan_id,
                title: "p".into(),
                owner: Owner::Executor,
                root_task_id: TaskId::new(),
                created_at: argentor_core::utc_now(),
                constraints: argentor_graph::Constraints { deadline: None, priority: argentor_core::Priority::Low },
            },
        )
        .unwrap();

        let event = TaskEvent {
            event_id: EventId::new(),
            plan_id,
            task_id: None,
            event_type: "PLAN_APPROVED".into(),
            payload: json!({"reviewer": "reviewer"}),
            created_at: argentor_core::utc_now(),
        };
        insert(&conn, &event).unwrap();

        let events = list_for_plan(&conn, plan_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "PLAN_APPROVED");
    }
}
