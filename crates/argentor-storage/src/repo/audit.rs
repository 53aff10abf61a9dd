use crate::conv::text_to_json;
use crate::error::StorageResult;
use crate::records::AuditEvent;
use argentor_core::{AuditId, LlmCallId, TaskId};
use rusqlite::{params, Connection};

pub fn insert(conn: &Connection, event: &AuditEvent) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO audit_events (audit_id, task_id, llm_call_id, action, before_json, after_json, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            event.audit_id.to_string(),
            event.task_id.map(|id| id.to_string()),
            event.llm_call_id.map(|id| id.to_string()),
            event.action,
            event.before.as_ref().map(serde_json::to_string).transpose()?,
            event.after.as_ref().map(serde_json::to_string).transpose()?,
            event.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_for_task(conn: &Connection, task_id: TaskId) -> StorageResult<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT audit_id, task_id, llm_call_id, action, before_json, after_json, created_at
         FROM audit_events WHERE task_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map([task_id.to_string()], row_to_event)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let audit_id: String = row.get(0)?;
    let task_id: Option<String> = row.get(1)?;
    let llm_call_id: Option<String> = row.get(2)?;
    let before_json: Option<String> = row.get(4)?;
    let after_json: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(AuditEvent {
        audit_id: AuditId::parse(&audit_id).map_err(|e| invalid(0, e.to_string()))?,
        task_id: task_id.map(|s| TaskId::parse(&s)).transpose().map_err(|e| invalid(1, e.to_string()))?,
        llm_call_id: llm_call_id.map(|s| LlmCallId::parse(&s)).transpose().map_err(|e| invalid(2, e.to_string()))?,
        action: row.get(3)?,
        before: before_json.map(|s| text_to_json(&s, "before_json")).transpose().map_err(|e| invalid(4, e.to_string()))?,
        after: after_json.map(|s| text_to_json(&s, "after_json")).transpose().map_err(|e| invalid(5, e.to_string()))?,
        created_at: argentor_core::parse_iso8601(&created_at).map_err(|e| invalid(6, e.to_string()))?,
    })
}
