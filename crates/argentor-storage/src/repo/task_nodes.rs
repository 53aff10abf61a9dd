use crate::conv::{from_text, json_to_text, text_to_json, to_text};
use crate::error::{StorageError, StorageResult};
use argentor_core::{ArtifactId, BlockedReason, NodeType, Owner, PlanId, TaskId, TaskStatus};
use argentor_graph::TaskNode;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert(conn: &Connection, node: &TaskNode) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO task_nodes (
            task_id, plan_id, node_type, title, goal_statement, rationale, owner_agent_id,
            priority, tags_json, status, blocked_reason, attempt_count, confidence,
            active_branch, active_artifact_id, approved_artifact_id, review_target_task_id,
            estimated_person_days, deliverable_spec_json, acceptance_criteria, review_output_spec_json
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)",
        params![
            node.task_id.to_string(),
            node.plan_id.to_string(),
            to_text(&node.node_type, "node_type")?,
            node.title,
            node.goal_statement,
            node.rationale,
            to_text(&node.owner, "owner_agent_id")?,
            node.priority,
            json_to_text(&node.tags)?,
            to_text(&node.status, "status")?,
            node.blocked_reason.map(|r| r.to_string()),
            node.attempt_count,
            node.confidence,
            node.active_branch,
            node.active_artifact_id.map(|id| id.to_string()),
            node.approved_artifact_id.map(|id| id.to_string()),
            node.review_target_task_id.map(|id| id.to_string()),
            node.estimated_person_days,
            node.deliverable_spec.as_ref().map(json_to_text).transpose()?,
            node.acceptance_criteria,
            node.review_output_spec.as_ref().map(json_to_text).transpose()?,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, node: &TaskNode) -> StorageResult<()> {
    conn.execute(
        "UPDATE task_nodes SET
            node_type = ?2, title = ?3, goal_statement = ?4, rationale = ?5, owner_agent_id = ?6,
            priority = ?7, tags_json = ?8, status = ?9, blocked_reason = ?10, attempt_count = ?11,
            confidence = ?12, active_branch = ?13, active_artifact_id = ?14,
            approved_artifact_id = ?15, review_target_task_id = ?16, estimated_person_days = ?17,
            deliverable_spec_json = ?18, acceptance_criteria = ?19, review_output_spec_json = ?20
         WHERE task_id = ?1",
        params![
            node.task_id.to_string(),
            to_text(&node.node_type, "node_type")?,
            node.title,
            node.goal_statement,
            node.rationale,
            to_text(&node.owner, "owner_agent_id")?,
            node.priority,
            json_to_text(&node.tags)?,
            to_text(&node.status, "status")?,
            node.blocked_reason.map(|r| r.to_string()),
            node.attempt_count,
            node.confidence,
            node.active_branch,
            node.active_artifact_id.map(|id| id.to_string()),
            node.approved_artifact_id.map(|id| id.to_string()),
            node.review_target_task_id.map(|id| id.to_string()),
            node.estimated_person_days,
            node.deliverable_spec.as_ref().map(json_to_text).transpose()?,
            node.acceptance_criteria,
            node.review_output_spec.as_ref().map(json_to_text).transpose()?,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, task_id: TaskId) -> StorageResult<TaskNode> {
    conn.query_row(&select_sql("WHERE task_id = ?1"), [task_id.to_string()], row_to_node)
        .optional()?
        .ok_or(StorageError::NotFound { entity: "task_node", id: task_id.to_string() })
}

pub fn list_for_plan(conn: &Connection, plan_id: PlanId) -> StorageResult<Vec<TaskNode>> {
    let mut stmt = conn.prepare(&select_sql("WHERE plan_id = ?1"))?;
    let rows = stmt.query_map([plan_id.to_string()], row_to_node)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

fn select_sql(clause: &str) -> String {
    format!(
        "SELECT task_id, plan_id, node_type, title, goal_statement, rationale, owner_agent_id,
                priority, tags_json, status, blocked_reason, attempt_count, confidence,
                active_branch, active_artifact_id, approved_artifact_id, review_target_task_id,
                estimated_person_days, deliverable_spec_json, acceptance_criteria,
                review_output_spec_json
         FROM task_nodes {clause}"
    )
}

fn invalid(col_idx: usize, column: &'static str, reason: String) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(col_idx, format!("{column}: {reason}"), rusqlite::types::Type::Text)
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskNode> {
    let task_id: String = row.get(0)?;
    let plan_id: String = row.get(1)?;
    let node_type: String = row.get(2)?;
    let owner: String = row.get(6)?;
    let tags_json: String = row.get(8)?;
    let status: String = row.get(9)?;
    let blocked_reason: Option<String> = row.get(10)?;
    let active_artifact_id: Option<String> = row.get(14)?;
    let approved_artifact_id: Option<String> = row.get(15)?;
    let review_target_task_id: Option<String> = row.get(16)?;
    let deliverable_spec_json: Option<String> = row.get(18)?;
    let review_output_spec_json: Option<String> = row.get(20)?;

    Ok(TaskNode {
        task_id: TaskId::parse(&task_id).map_err(|e| invalid(0, "task_id", e.to_string()))?,
        plan_id: PlanId::parse(&plan_id).map_err(|e| invalid(1, "plan_id", e.to_string()))?,
        node_type: from_text::<NodeType>(&node_type, "node_type").map_err(|e| invalid(2, "node_type", e.to_string()))?,
        title: row.get(3)?,
        goal_statement: row.get(4)?,
        rationale: row.get(5)?,
        owner: from_text::<Owner>(&owner, "owner_agent_id").map_err(|e| invalid(6, "owner_agent_id", e.to_string()))?,
        priority: row.get(7)?,
        tags: text_to_json::<Vec<String>>(&tags_json, "tags_json").map_err(|e| invalid(8, "tags_json", e.to_string()))?,
        status: from_text::<TaskStatus>(&status, "status").map_err(|e| invalid(9, "status", e.to_string()))?,
        blocked_reason: blocked_reason
            .map(|s| parse_blocked_reason(&s))
            .transpose()
            .map_err(|e| invalid(10, "blocked_reason", e))?,
        attempt_count: row.get(11)?,
        confidence: row.get(12)?,
        active_branch: row.get(13)?,
        active_artifact_id: active_artifact_id
            .map(|s| ArtifactId::parse(&s))
            .transpose()
            .map_err(|e| invalid(14, "active_artifact_id", e.to_string()))?,
        approved_artifact_id: approved_artifact_id
            .map(|s| ArtifactId::parse(&s))
            .transpose()
            .map_err(|e| invalid(15, "approved_artifact_id", e.to_string()))?,
        review_target_task_id: review_target_task_id
            .map(|s| TaskId::parse(&s))
            .transpose()
            .map_err(|e| invalid(16, "review_target_task_id", e.to_string()))?,
        estimated_person_days: row.get(17)?,
        deliverable_spec: deliverable_spec_json
            .map(|s| text_to_json(&s, "deliverable_spec_json"))
            .transpose()
            .map_err(|e| invalid(18, "deliverable_spec_json", e.to_string()))?,
        acceptance_criteria: row.get(19)?,
        review_output_spec: review_output_spec_json
            .map(|s| text_to_json(&s, "review_output_spec_json"))
            .transpose()
            .map_err(|e| invalid(20, "review_output_spec_json", e.to_string()))?,
    })
}

fn parse_blocked_reason(s: &str) -> Result<BlockedReason, String> {
    match s {
        "WAITING_INPUT" => Ok(BlockedReason::WaitingInput),
        "WAITING_EXTERNAL" => Ok(BlockedReason::WaitingExternal),
        "WAITING_SKILL" => Ok(BlockedReason::WaitingSkill),
        other => Err(format!("unknown blocked_reason: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_updates_and_fetches_a_node() {
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

        let mut node = TaskNode::new(plan_id, NodeType::Action, "write draft", Owner::Executor);
        insert(&conn, &node).unwrap();

        node.status = TaskStatus::Ready;
        node.attempt_count = 1;
        update(&conn, &node).unwrap();

        let fetched = get(&conn, node.task_id).unwrap();
        assert_eq!(fetched.status, TaskStatus::Ready);
        assert_eq!(fetched.attempt_count, 1);
        assert_eq!(fetched.title, "write draft");
    }

    #[test]
    fn lists_nodes_scoped_to_their_plan() {
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
        let node = TaskNode::new(plan_id, NodeType::Goal, "root", Owner::Executor);
        insert(&conn, &node).unwrap();
        let all = list_for_plan(&conn, plan_id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].task_id, node.task_id);
    }
}
