use crate::conv::{from_text, json_to_text, text_to_json, to_text};
use crate::error::StorageResult;
use argentor_core::{EdgeId, EdgeType, PlanId, TaskId};
use argentor_graph::{EdgeMetadata, TaskEdge};
use rusqlite::{params, Connection};

pub fn insert(conn: &Connection, edge: &TaskEdge) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO task_edges (edge_id, plan_id, from_task_id, to_task_id, edge_type, metadata_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            edge.edge_id.to_string(),
            edge.plan_id.to_string(),
            edge.from_task_id.to_string(),
            edge.to_task_id.to_string(),
            to_text(&edge.edge_type, "edge_type")?,
            json_to_text(&edge.metadata)?,
        ],
    )?;
    Ok(())
}

pub fn list_for_plan(conn: &Connection, plan_id: PlanId) -> StorageResult<Vec<TaskEdge>> {
    let mut stmt = conn.prepare(
        "SELECT edge_id, plan_id, from_task_id, to_task_id, edge_type, metadata_json
         FROM task_edges WHERE plan_id = ?1",
    )?;
    let rows = stmt.query_map([plan_id.to_string()], row_to_edge)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(crate::error::StorageError::from)
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskEdge> {
    let edge_id: String = row.get(0)?;
    let plan_id: String = row.get(1)?;
    let from_task_id: String = row.get(2)?;
    let to_task_id: String = row.get(3)?;
    let edge_type: String = row.get(4)?;
    let metadata_json: String = row.get(5)?;
    let invalid = |idx: usize, reason: String| {
        rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text)
    };
    Ok(TaskEdge {
        edge_id: EdgeId::parse(&edge_id).map_err(|e| invalid(0, e.to_string()))?,
        plan_id: PlanId::parse(&plan_id).map_err(|e| invalid(1, e.to_string()))?,
        from_task_id: TaskId::parse(&from_task_id).map_err(|e| invalid(2, e.to_string()))?,
        to_task_id: TaskId::parse(&to_task_id).map_err(|e| invalid(3, e.to_string()))?,
        edge_type: from_text::<EdgeType>(&edge_type, "edge_type").map_err(|e| invalid(4, e.to_string()))?,
        metadata: text_to_json::<EdgeMetadata>(&metadata_json, "metadata_json").map_err(|e| invalid(5, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::Owner;

    fn seed_plan(conn: &Connection) -> PlanId {
        let plan_id = PlanId::new();
        super::super::plans::insert(
            conn,
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
        plan_id
    }

    #[test]
    fn inserts_and_lists_edges_for_a_plan() {
        let conn = crate::connection::open_in_memory().unwrap();
        let plan_id = seed_plan(&conn);
        let parent = argentor_graph::TaskNode::new(plan_id, argentor_core::NodeType::Goal, "root", Owner::Executor);
        let child = argentor_graph::TaskNode::new(plan_id, argentor_core::NodeType::Action, "step", Owner::Executor);
        super::super::task_nodes::insert(&conn, &parent).unwrap();
        super::super::task_nodes::insert(&conn, &child).unwrap();

        let edge = TaskEdge {
            edge_id: EdgeId::new(),
            plan_id,
            from_task_id: parent.task_id,
            to_task_id: child.task_id,
            edge_type: EdgeType::Decompose,
            metadata: EdgeMetadata { and_or: Some(argentor_core::AndOr::And), group_id: None },
        };
        insert(&conn, &edge).unwrap();

        let edges = list_for_plan(&conn, plan_id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::Decompose);
    }
}
