//! Structural database audit (spec §6 `doctor`/`repair-db`): cheap
//! referential-integrity checks that don't depend on SQLite foreign-key
//! enforcement actually being on. Grounded on `core/doctor.py`'s
//! `run_doctor`.

use argentor_storage::Store;
use rusqlite::Connection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorIssue {
    pub code: &'static str,
    pub message: String,
}

const EXPECTED_TABLES: &[&str] = &[
    "schema_migrations",
    "plans",
    "task_nodes",
    "task_edges",
    "input_requirements",
    "evidences",
    "artifacts",
    "reviews",
    "skill_runs",
    "task_events",
    "task_error_counters",
    "prompts",
    "input_files",
    "llm_calls",
    "audit_events",
];

fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |_| Ok(()),
    )
    .is_ok()
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0)
}

/// Runs the full set of structural checks against `store`'s connection.
/// When `plan_id` is set, also runs the plan-scoped checks.
pub fn run_doctor(store: &Store, plan_id: Option<&str>) -> Vec<DoctorIssue> {
    let conn = store.connection();
    let mut issues = Vec::new();

    let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap_or(0);
    if fk != 1 {
        issues.push(DoctorIssue {
            code: "DB_FOREIGN_KEYS_OFF",
            message: "PRAGMA foreign_keys is OFF (expected ON)".into(),
        });
    }

    for table in EXPECTED_TABLES {
        if !table_exists(conn, table) {
            issues.push(DoctorIssue { code: "DB_MISSING_TABLE", message: format!("missing table: {table}") });
        }
    }

    if table_exists(conn, "task_nodes") && table_exists(conn, "plans") {
        let bad = count(
            conn,
            "SELECT COUNT(1) FROM task_nodes n LEFT JOIN plans p ON p.plan_id = n.plan_id WHERE p.plan_id IS NULL",
        );
        if bad > 0 {
            issues.push(DoctorIssue {
                code: "DB_ORPHAN_TASK_NODES",
                message: format!("task_nodes.plan_id not found in plans: {bad} row(s)"),
            });
        }

        let bad = count(
            conn,
            "SELECT COUNT(1) FROM plans p LEFT JOIN task_nodes n ON n.task_id = p.root_task_id WHERE n.task_id IS NULL",
        );
        if bad > 0 {
            issues.push(DoctorIssue {
                code: "DB_BAD_ROOT_TASK",
                message: format!("plans.root_task_id missing in task_nodes: {bad} plan(s)"),
            });
        }
    }

    if table_exists(conn, "task_edges") && table_exists(conn, "task_nodes") {
        let bad = count(
            conn,
            "SELECT COUNT(1) FROM task_edges e \
             LEFT JOIN task_nodes a ON a.task_id = e.from_task_id \
             LEFT JOIN task_nodes b ON b.task_id = e.to_task_id \
             WHERE a.task_id IS NULL OR b.task_id IS NULL",
        );
        if bad > 0 {
            issues.push(DoctorIssue {
                code: "DB_ORPHAN_EDGES",
                message: format!("task_edges endpoints missing in task_nodes: {bad} edge(s)"),
            });
        }
    }

    if table_exists(conn, "task_events") && table_exists(conn, "plans") {
        let bad = count(
            conn,
            "SELECT COUNT(1) FROM task_events e LEFT JOIN plans p ON p.plan_id = e.plan_id WHERE p.plan_id IS NULL",
        );
        if bad > 0 {
            issues.push(DoctorIssue {
                code: "DB_ORPHAN_EVENTS",
                message: format!("task_events.plan_id not found in plans: {bad} event(s)"),
            });
        }
    }

    if let Some(plan_id) = plan_id {
        if table_exists(conn, "plans") {
            let found = conn
                .query_row("SELECT 1 FROM plans WHERE plan_id=?1", [plan_id], |_| Ok(()))
                .is_ok();
            if !found {
                issues.push(DoctorIssue { code: "PLAN_NOT_FOUND", message: format!("plan_id not found in DB: {plan_id}") });
            } else if table_exists(conn, "task_nodes") && table_exists(conn, "task_edges") {
                let node_count: i64 = conn
                    .query_row("SELECT COUNT(1) FROM task_nodes WHERE plan_id=?1", [plan_id], |row| row.get(0))
                    .unwrap_or(0);
                let edge_count: i64 = conn
                    .query_row("SELECT COUNT(1) FROM task_edges WHERE plan_id=?1", [plan_id], |row| row.get(0))
                    .unwrap_or(0);
                if node_count > 1 && edge_count == 0 {
                    issues.push(DoctorIssue {
                        code: "PLAN_MISSING_EDGES",
                        message: format!("plan has {node_count} nodes but 0 edges (missing DECOMPOSE tree)"),
                    });
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_freshly_migrated_store_has_no_issues() {
        let store = Store::open_in_memory().unwrap();
        let issues = run_doctor(&store, None);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn unknown_plan_id_is_flagged() {
        let store = Store::open_in_memory().unwrap();
        let issues = run_doctor(&store, Some("plan-does-not-exist"));
        assert!(issues.iter().any(|i| i.code == "PLAN_NOT_FOUND"));
    }
}
