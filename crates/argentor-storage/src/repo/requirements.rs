use crate::conv::{from_text, json_to_text, text_to_json, to_text};
use crate::error::StorageResult;
use argentor_core::{EvidenceId, RequirementId, RequirementKind, RequirementSource, TaskId};
use argentor_graph::{Evidence, InputRequirement};
use rusqlite::{params, Connection};

pub fn insert_requirement(conn: &Connection, req: &InputRequirement) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO input_requirements
            (requirement_id, task_id, name, kind, required, min_count, allowed_types_json, source, validation_json)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            req.requirement_id.to_string(),
            req.task_id.to_string(),
            req.name,
            to_text(&req.kind, "kind")?,
            req.required,
            req.min_count,
            json_to_text(&req.allowed_types)?,
            to_text(&req.source, "source")?,
            req.validation.as_ref().map(json_to_text).transpose()?,
        ],
    )?;
    Ok(())
}

pub fn list_for_task(conn: &Connection, task_id: TaskId) -> StorageResult<Vec<InputRequirement>> {
    let mut stmt = conn.prepare(
        "SELECT requirement_id, task_id, name, kind, required, min_count, allowed_types_json, source, validation_json
         FROM input_requirements WHERE task_id = ?1",
    )?;
    let rows = stmt.query_map([task_id.to_string()], row_to_requirement)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_requirement(row: &rusqlite::Row<'_>) -> rusqlite::Result<InputRequirement> {
    let requirement_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let kind: String = row.get(3)?;
    let allowed_types_json: String = row.get(6)?;
    let source: String = row.get(7)?;
    let validation_json: Option<String> = row.get(8)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(InputRequirement {
        requirement_id: RequirementId::parse(&requirement_id).map_err(|e| invalid(0, e.to_string()))?,
        task_id: TaskId::parse(&task_id).map_err(|e| invalid(1, e.to_string()))?,
        name: row.get(2)?,
        kind: from_text::<RequirementKind>(&kind, "kind").map_err(|e| invalid(3, e.to_string()))?,
        required: row.get(4)?,
        min_count: row.get(5)?,
        allowed_types: text_to_json::<Vec<String>>(&allowed_types_json, "allowed_types_json").map_err(|e| invalid(6, e.to_string()))?,
        source: from_text::<RequirementSource>(&source, "source").map_err(|e| invalid(7, e.to_string()))?,
        validation: validation_json.map(|s| text_to_json(&s, "validation_json")).transpose().map_err(|e| invalid(8, e.to_string()))?,
    })
}

pub fn insert_evidence(conn: &Connection, evidence: &Evidence) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO evidences (evidence_id, requirement_id, path, sha256, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            evidence.evidence_id.to_string(),
            evidence.requirement_id.to_string(),
            evidence.path,
            evidence.sha256,
            evidence.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_evidence_for_requirement(conn: &Connection, requirement_id: RequirementId) -> StorageResult<Vec<Evidence>> {
    let mut stmt = conn.prepare(
        "SELECT evidence_id, requirement_id, path, sha256, created_at
         FROM evidences WHERE requirement_id = ?1",
    )?;
    let rows = stmt.query_map([requirement_id.to_string()], row_to_evidence)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_evidence(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evidence> {
    let evidence_id: String = row.get(0)?;
    let requirement_id: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(Evidence {
        evidence_id: EvidenceId::parse(&evidence_id).map_err(|e| invalid(0, e.to_string()))?,
        requirement_id: RequirementId::parse(&requirement_id).map_err(|e| invalid(1, e.to_string()))?,
        path: row.get(2)?,
        sha256: row.get(3)?,
        created_at: argentor_core::parse_iso8601(&created_at).map_err(|e| invalid(4, e.to_string()))?,
    })
}
