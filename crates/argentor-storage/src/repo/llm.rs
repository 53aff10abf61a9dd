use crate::conv::text_to_json;
use crate::error::StorageResult;
use crate::records::LlmCall;
use argentor_core::{LlmCallId, TaskId};
use rusqlite::{params, Connection};

pub fn insert(conn: &Connection, call: &LlmCall) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO llm_calls (llm_call_id, task_id, provider, raw_text, parsed_json, error_code, started_at, finished_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            call.llm_call_id.to_string(),
            call.task_id.map(|id| id.to_string()),
            call.provider,
            call.raw_text,
            call.parsed_json.as_ref().map(serde_json::to_string).transpose()?,
            call.error_code,
            call.started_at.to_rfc3339(),
            call.finished_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn list_for_task(conn: &Connection, task_id: TaskId) -> StorageResult<Vec<LlmCall>> {
    let mut stmt = conn.prepare(
        "SELECT llm_call_id, task_id, provider, raw_text, parsed_json, error_code, started_at, finished_at
         FROM llm_calls WHERE task_id = ?1 ORDER BY started_at",
    )?;
    let rows = stmt.query_map([task_id.to_string()], row_to_call)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<LlmCall> {
    let llm_call_id: String = row.get(0)?;
    let task_id: Option<String> = row.get(1)?;
    let parsed_json: Option<String> = row.get(4)?;
    let started_at: String = row.get(6)?;
    let finished_at: Option<String> = row.get(7)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(LlmCall {
        llm_call_id: LlmCallId::parse(&llm_call_id).map_err(|e| invalid(0, e.to_string()))?,
        task_id: task_id.map(|s| TaskId::parse(&s)).transpose().map_err(|e| invalid(1, e.to_string()))?,
        provider: row.get(2)?,
        raw_text: row.get(3)?,
        parsed_json: parsed_json.map(|s| text_to_json(&s, "parsed_json")).transpose().map_err(|e| invalid(4, e.to_string()))?,
        error_code: row.get(5)?,
        started_at: argentor_core::parse_iso8601(&started_at).map_err(|e| invalid(6, e.to_string()))?,
        finished_at: finished_at.map(|s| argentor_core::parse_iso8601(&s)).transpose().map_err(|e| invalid(7, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_a_failed_llm_call() {
        let conn = crate::connection::open_in_memory().unwrap();
        let call = LlmCall {
            llm_call_id: LlmCallId::new(),
            task_id: None,
            provider: "anthropic".into(),
            raw_text: Some("not json".into()),
            parsed_json: None,
            error_code: Some("PARSE_ERROR".into()),
            started_at: argentor_core::utc_now(),
            finished_at: Some(argentor_core::utc_now()),
        };
        insert(&conn, &call).unwrap();
        let none_task = list_for_task(&conn, TaskId::new()).unwrap();
        assert!(none_task.is_empty());
    }
}
