use crate::conv::{json_to_text, text_to_json};
use crate::error::{StorageError, StorageResult};
use argentor_core::{utc_now_iso, Owner, PlanId, TaskId};
use argentor_graph::{Constraints, Plan};
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert(conn: &Connection, plan: &Plan) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO plans (plan_id, title, owner, root_task_id, created_at, constraints_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            plan.plan_id.to_string(),
            plan.title,
            crate::conv::to_text(&plan.owner, "owner")?,
            plan.root_task_id.to_string(),
            plan.created_at.to_rfc3339(),
            json_to_text(&plan.constraints)?,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, plan_id: PlanId) -> StorageResult<Plan> {
    conn.query_row(
        "SELECT plan_id, title, owner, root_task_id, created_at, constraints_json
         FROM plans WHERE plan_id = ?1",
        [plan_id.to_string()],
        row_to_plan,
    )
    .optional()?
    .ok_or(StorageError::NotFound { entity: "plan", id: plan_id.to_string() })
}

pub fn list(conn: &Connection) -> StorageResult<Vec<Plan>> {
    let mut stmt = conn.prepare(
        "SELECT plan_id, title, owner, root_task_id, created_at, constraints_json
         FROM plans ORDER BY created_at",
    )?;
    let rows = stmt.query_map([], row_to_plan)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plan> {
    let plan_id: String = row.get(0)?;
    let owner: String = row.get(2)?;
    let root_task_id: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let constraints_json: String = row.get(5)?;
    Ok(Plan {
        plan_id: PlanId::parse(&plan_id).map_err(|e| rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text))?,
        title: row.get(1)?,
        owner: crate::conv::from_text::<Owner>(&owner, "owner")
            .map_err(|e| rusqlite::Error::InvalidColumnType(2, e.to_string(), rusqlite::types::Type::Text))?,
        root_task_id: TaskId::parse(&root_task_id)
            .map_err(|e| rusqlite::Error::InvalidColumnType(3, e.to_string(), rusqlite::types::Type::Text))?,
        created_at: argentor_core::parse_iso8601(&created_at)
            .map_err(|e| rusqlite::Error::InvalidColumnType(4, e.to_string(), rusqlite::types::Type::Text))?,
        constraints: text_to_json::<Constraints>(&constraints_json, "constraints_json")
            .map_err(|e| rusqlite::Error::InvalidColumnType(5, e.to_string(), rusqlite::types::Type::Text))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::Priority;

    fn sample_plan() -> Plan {
        Plan {
            plan_id: PlanId::new(),
            title: "migrate billing".into(),
            owner: Owner::Executor,
            root_task_id: TaskId::new(),
            created_at: argentor_core::utc_now(),
            constraints: Constraints { deadline: None, priority: Priority::Med },
        }
    }

    #[test]
    fn inserts_and_fetches_a_plan() {
        let conn = crate::connection::open_in_memory().unwrap();
        let plan = sample_plan();
        insert(&conn, &plan).unwrap();
        let fetched = get(&conn, plan.plan_id).unwrap();
        assert_eq!(fetched.title, plan.title);
        assert_eq!(fetched.root_task_id, plan.root_task_id);
    }

    #[test]
    fn missing_plan_is_not_found() {
        let conn = crate::connection::open_in_memory().unwrap();
        let err = get(&conn, PlanId::new()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "plan", .. }));
    }

    #[test]
    fn list_orders_by_created_at() {
        let conn = crate::connection::open_in_memory().unwrap();
        let a = sample_plan();
        insert(&conn, &a).unwrap();
        let all = list(&conn).unwrap();
        assert_eq!(all.len(), 1);
        let _ = utc_now_iso();
    }
}
