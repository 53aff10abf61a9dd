use crate::conv::{from_text, to_text};
use crate::error::{StorageError, StorageResult};
use argentor_core::{ArtifactFormat, ArtifactId, TaskId};
use argentor_graph::Artifact;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert(conn: &Connection, artifact: &Artifact) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO artifacts (artifact_id, task_id, name, path, format, version, sha256, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            artifact.artifact_id.to_string(),
            artifact.task_id.to_string(),
            artifact.name,
            artifact.path,
            to_text(&artifact.format, "format")?,
            artifact.version,
            artifact.sha256,
            artifact.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, artifact_id: ArtifactId) -> StorageResult<Artifact> {
    conn.query_row(
        "SELECT artifact_id, task_id, name, path, format, version, sha256, created_at
         FROM artifacts WHERE artifact_id = ?1",
        [artifact_id.to_string()],
        row_to_artifact,
    )
    .optional()?
    .ok_or(StorageError::NotFound { entity: "artifact", id: artifact_id.to_string() })
}

pub fn list_for_task(conn: &Connection, task_id: TaskId) -> StorageResult<Vec<Artifact>> {
    let mut stmt = conn.prepare(
        "SELECT artifact_id, task_id, name, path, format, version, sha256, created_at
         FROM artifacts WHERE task_id = ?1 ORDER BY version",
    )?;
    let rows = stmt.query_map([task_id.to_string()], row_to_artifact)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    let artifact_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let format: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(Artifact {
        artifact_id: ArtifactId::parse(&artifact_id).map_err(|e| invalid(0, e.to_string()))?,
        task_id: TaskId::parse(&task_id).map_err(|e| invalid(1, e.to_string()))?,
        name: row.get(2)?,
        path: row.get(3)?,
        format: from_text::<ArtifactFormat>(&format, "format").map_err(|e| invalid(4, e.to_string()))?,
        version: row.get(5)?,
        sha256: row.get(6)?,
        created_at: argentor_core::parse_iso8601(&created_at).map_err(|e| invalid(7, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{NodeType, Owner};

    #[test]
    fn lists_artifact_versions_in_order() {
        let conn = crate::connection::open_in_memory().unwrap();
        let plan_id = argentor_core::PlanId::new();
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
        let node = argentor_graph::TaskNode::new(plan_id, NodeType::Action, "draft", Owner::Executor);
        super::super::task_nodes::insert(&conn, &node).unwrap();

        for version in 1..=2 {
            let artifact = Artifact {
                artifact_id: ArtifactId::new(),
                task_id: node.task_id,
                name: "draft.md".into(),
                path: format!("/tmp/draft_v{version}.md"),
                format: ArtifactFormat::Md,
                version,
                sha256: format!("hash{version}"),
                created_at: argentor_core::utc_now(),
            };
            insert(&conn, &artifact).unwrap();
        }

        let versions = list_for_task(&conn, node.task_id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[1].version, 2);

        let fetched = get(&conn, versions[0].artifact_id).unwrap();
        assert_eq!(fetched.sha256, "hash1");
    }
}
