//! `input_files` repository (spec §2 "Input file scanning"). Grounded on
//! `core/matcher.py`'s `scan_inputs_and_bind_evidence`/
//! `detect_removed_input_files`: a plan-scoped ledger of every file seen
//! under its inputs directory, used to detect later removals.

use crate::error::StorageResult;
use crate::records::InputFile;
use argentor_core::{InputFileId, PlanId, RequirementId};
use rusqlite::{params, OptionalExtension};

const SELECT_COLUMNS: &str = "input_file_id, plan_id, path, sha256, discovered_at, bound_requirement_id";

/// Records `path`/`sha256` as seen under `plan_id`, unless a row for the
/// exact same `(plan_id, path, sha256)` already exists. Returns `None`
/// when nothing changed — already-seen files aren't re-inserted.
pub fn insert_if_absent(conn: &rusqlite::Connection, plan_id: PlanId, path: &str, sha256: &str, now: chrono::DateTime<chrono::Utc>) -> StorageResult<Option<InputFile>> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT input_file_id FROM input_files WHERE plan_id = ?1 AND path = ?2 AND sha256 = ?3",
            params![plan_id.to_string(), path, sha256],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(None);
    }
    let file = InputFile {
        input_file_id: InputFileId::new(),
        plan_id,
        path: path.to_string(),
        sha256: sha256.to_string(),
        discovered_at: now,
        bound_requirement_id: None,
    };
    conn.execute(
        &format!("INSERT INTO input_files ({SELECT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6)"),
        params![
            file.input_file_id.to_string(),
            file.plan_id.to_string(),
            file.path,
            file.sha256,
            file.discovered_at.to_rfc3339(),
            file.bound_requirement_id.map(|r| r.to_string()),
        ],
    )?;
    Ok(Some(file))
}

/// Binds a previously-scanned file to the requirement it best satisfies.
pub fn bind_requirement(conn: &rusqlite::Connection, input_file_id: InputFileId, requirement_id: RequirementId) -> StorageResult<()> {
    conn.execute(
        "UPDATE input_files SET bound_requirement_id = ?1 WHERE input_file_id = ?2",
        params![requirement_id.to_string(), input_file_id.to_string()],
    )?;
    Ok(())
}

/// Every file scanned for `plan_id`, most-recently-discovered first.
pub fn list_for_plan(conn: &rusqlite::Connection, plan_id: PlanId) -> StorageResult<Vec<InputFile>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM input_files WHERE plan_id = ?1 ORDER BY discovered_at DESC"))?;
    let rows = stmt.query_map(params![plan_id.to_string()], row_to_input_file)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

/// Drops the ledger row for a file that has disappeared from disk.
pub fn remove(conn: &rusqlite::Connection, input_file_id: InputFileId) -> StorageResult<()> {
    conn.execute("DELETE FROM input_files WHERE input_file_id = ?1", params![input_file_id.to_string()])?;
    Ok(())
}

fn row_to_input_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<InputFile> {
    let input_file_id: String = row.get(0)?;
    let plan_id: String = row.get(1)?;
    let discovered_at: String = row.get(4)?;
    let bound_requirement_id: Option<String> = row.get(5)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(InputFile {
        input_file_id: InputFileId::parse(&input_file_id).map_err(|e| invalid(0, e.to_string()))?,
        plan_id: PlanId::parse(&plan_id).map_err(|e| invalid(1, e.to_string()))?,
        path: row.get(2)?,
        sha256: row.get(3)?,
        discovered_at: argentor_core::parse_iso8601(&discovered_at).map_err(|e| invalid(4, e.to_string()))?,
        bound_requirement_id: bound_requirement_id.map(|s| RequirementId::parse(&s)).transpose().map_err(|e| invalid(5, e.to_string()))?,
    })
}
