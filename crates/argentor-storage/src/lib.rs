//! Durable SQLite-backed persistence for the workflow engine's plans, task
//! graph, artifacts, reviews, skill runs, events, LLM call log, and audit
//! trail (spec §6 Persistence).
//!
//! Unlike most of this workspace, there's no teacher Rust module to adapt
//! here: the original implementation's SQLite layer (`core/db.py`) is the
//! primary grounding source for the migration runner and pragma choices;
//! the table shapes mirror the entities in `argentor_graph` plus the
//! storage-only event/log/audit records defined in [`records`].

mod connection;
mod conv;
mod error;
mod migrations;
mod records;
mod repo;

pub use error::{StorageError, StorageResult};
pub use records::{AuditEvent, ErrorCounter, InputFile, LlmCall, Prompt, SkillRun, TaskEvent};

use argentor_core::{ArtifactId, InputFileId, PlanId, RequirementId, TaskId};
use argentor_graph::{Artifact, Evidence, InputRequirement, Plan, Review, TaskEdge, TaskNode};
use rusqlite::Connection;
use std::path::Path;

/// A single SQLite-backed store for one plan database.
///
/// `Store` owns its connection outright; callers that need to share one
/// across threads wrap it in their own `Arc<Mutex<Store>>` at the call
/// site rather than this crate baking in a concurrency policy it doesn't
/// need.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if absent) the database file at `path`, applying
    /// pragmas and pending migrations.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self { conn: connection::open(path)? })
    }

    /// Opens an in-memory database. Mainly useful for tests and the `doctor`
    /// CLI command's dry-run mode.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self { conn: connection::open_in_memory()? })
    }

    /// Gives direct access to the underlying connection for callers that
    /// need a custom query (e.g. the CLI's `doctor`/`report` commands).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // -- plans --------------------------------------------------------

    pub fn insert_plan(&self, plan: &Plan) -> StorageResult<()> {
        repo::plans::insert(&self.conn, plan)
    }

    pub fn get_plan(&self, plan_id: PlanId) -> StorageResult<Plan> {
        repo::plans::get(&self.conn, plan_id)
    }

    pub fn list_plans(&self) -> StorageResult<Vec<Plan>> {
        repo::plans::list(&self.conn)
    }

    // -- task nodes -----------------------------------------------------

    pub fn insert_task_node(&self, node: &TaskNode) -> StorageResult<()> {
        repo::task_nodes::insert(&self.conn, node)
    }

    pub fn update_task_node(&self, node: &TaskNode) -> StorageResult<()> {
        repo::task_nodes::update(&self.conn, node)
    }

    pub fn get_task_node(&self, task_id: TaskId) -> StorageResult<TaskNode> {
        repo::task_nodes::get(&self.conn, task_id)
    }

    pub fn list_task_nodes(&self, plan_id: PlanId) -> StorageResult<Vec<TaskNode>> {
        repo::task_nodes::list_for_plan(&self.conn, plan_id)
    }

    // -- task edges -----------------------------------------------------

    pub fn insert_task_edge(&self, edge: &TaskEdge) -> StorageResult<()> {
        repo::task_edges::insert(&self.conn, edge)
    }

    pub fn list_task_edges(&self, plan_id: PlanId) -> StorageResult<Vec<TaskEdge>> {
        repo::task_edges::list_for_plan(&self.conn, plan_id)
    }

    // -- requirements & evidence -----------------------------------------

    pub fn insert_requirement(&self, req: &InputRequirement) -> StorageResult<()> {
        repo::requirements::insert_requirement(&self.conn, req)
    }

    pub fn list_requirements(&self, task_id: TaskId) -> StorageResult<Vec<InputRequirement>> {
        repo::requirements::list_for_task(&self.conn, task_id)
    }

    pub fn insert_evidence(&self, evidence: &Evidence) -> StorageResult<()> {
        repo::requirements::insert_evidence(&self.conn, evidence)
    }

    pub fn list_evidence(&self, requirement_id: RequirementId) -> StorageResult<Vec<Evidence>> {
        repo::requirements::list_evidence_for_requirement(&self.conn, requirement_id)
    }

    // -- artifacts --------------------------------------------------------

    pub fn insert_artifact(&self, artifact: &Artifact) -> StorageResult<()> {
        repo::artifacts::insert(&self.conn, artifact)
    }

    pub fn get_artifact(&self, artifact_id: ArtifactId) -> StorageResult<Artifact> {
        repo::artifacts::get(&self.conn, artifact_id)
    }

    pub fn list_artifacts(&self, task_id: TaskId) -> StorageResult<Vec<Artifact>> {
        repo::artifacts::list_for_task(&self.conn, task_id)
    }

    // -- reviews ------------------------------------------------------

    /// Atomically records a review, or returns `Ok(None)` if a racing
    /// writer already recorded one under the same idempotency key.
    pub fn insert_review_if_absent(&self, review: &Review) -> StorageResult<Option<argentor_core::ReviewId>> {
        repo::reviews::insert_if_absent(&self.conn, review)
    }

    pub fn find_review_by_idempotency_key(&self, key: &str) -> StorageResult<Option<Review>> {
        repo::reviews::find_by_idempotency_key(&self.conn, key)
    }

    pub fn list_reviews_for_target(&self, review_target_task_id: TaskId) -> StorageResult<Vec<Review>> {
        repo::reviews::list_for_target(&self.conn, review_target_task_id)
    }

    // -- skill runs ---------------------------------------------------

    pub fn record_skill_run(&self, run: &SkillRun) -> StorageResult<()> {
        repo::skill_runs::insert(&self.conn, run)
    }

    /// A cached successful run for this skill + idempotency key, if any.
    pub fn find_cached_skill_run(&self, skill_name: &str, idempotency_key: &str) -> StorageResult<Option<SkillRun>> {
        repo::skill_runs::find_cached_success(&self.conn, skill_name, idempotency_key)
    }

    pub fn list_skill_runs(&self, task_id: TaskId) -> StorageResult<Vec<SkillRun>> {
        repo::skill_runs::list_for_task(&self.conn, task_id)
    }

    // -- events, LLM calls, audit trail -----------------------------------

    pub fn record_event(&self, event: &TaskEvent) -> StorageResult<()> {
        repo::events::insert(&self.conn, event)
    }

    pub fn list_events(&self, plan_id: PlanId) -> StorageResult<Vec<TaskEvent>> {
        repo::events::list_for_plan(&self.conn, plan_id)
    }

    pub fn record_llm_call(&self, call: &LlmCall) -> StorageResult<()> {
        repo::llm::insert(&self.conn, call)
    }

    pub fn list_llm_calls(&self, task_id: TaskId) -> StorageResult<Vec<LlmCall>> {
        repo::llm::list_for_task(&self.conn, task_id)
    }

    pub fn record_audit_event(&self, event: &AuditEvent) -> StorageResult<()> {
        repo::audit::insert(&self.conn, event)
    }

    pub fn list_audit_events(&self, task_id: TaskId) -> StorageResult<Vec<AuditEvent>> {
        repo::audit::list_for_task(&self.conn, task_id)
    }

    // -- prompts --------------------------------------------------------

    pub fn insert_prompt(&self, prompt: &Prompt) -> StorageResult<()> {
        repo::prompts::insert(&self.conn, prompt)
    }

    /// Registers `body` under `name`, reusing the current version if its
    /// body is unchanged, else allocating the next one.
    pub fn register_prompt(&self, name: &str, body: &str) -> StorageResult<Prompt> {
        repo::prompts::register(&self.conn, name, body)
    }

    pub fn latest_prompt(&self, name: &str) -> StorageResult<Option<Prompt>> {
        repo::prompts::latest(&self.conn, name)
    }

    pub fn get_prompt_version(&self, name: &str, version: i64) -> StorageResult<Option<Prompt>> {
        repo::prompts::get_version(&self.conn, name, version)
    }

    pub fn list_latest_prompts(&self) -> StorageResult<Vec<Prompt>> {
        repo::prompts::list_latest(&self.conn)
    }

    // -- error counters ---------------------------------------------------

    pub fn increment_error_counter(&self, task_id: TaskId, error_code: &str, now: chrono::DateTime<chrono::Utc>) -> StorageResult<i64> {
        repo::error_counters::increment(&self.conn, task_id, error_code, now)
    }

    pub fn get_error_counter(&self, task_id: TaskId, error_code: &str) -> StorageResult<Option<i64>> {
        repo::error_counters::get(&self.conn, task_id, error_code)
    }

    pub fn list_error_counters(&self, task_id: TaskId) -> StorageResult<Vec<ErrorCounter>> {
        repo::error_counters::list_for_task(&self.conn, task_id)
    }

    pub fn reset_error_counters_for_task(&self, task_id: TaskId) -> StorageResult<()> {
        repo::error_counters::reset_all_for_task(&self.conn, task_id)
    }

    // -- input files ------------------------------------------------------

    pub fn record_input_file_if_absent(
        &self,
        plan_id: PlanId,
        path: &str,
        sha256: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<Option<InputFile>> {
        repo::input_files::insert_if_absent(&self.conn, plan_id, path, sha256, now)
    }

    pub fn bind_input_file_requirement(&self, input_file_id: InputFileId, requirement_id: RequirementId) -> StorageResult<()> {
        repo::input_files::bind_requirement(&self.conn, input_file_id, requirement_id)
    }

    pub fn list_input_files(&self, plan_id: PlanId) -> StorageResult<Vec<InputFile>> {
        repo::input_files::list_for_plan(&self.conn, plan_id)
    }

    pub fn remove_input_file(&self, input_file_id: InputFileId) -> StorageResult<()> {
        repo::input_files::remove(&self.conn, input_file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{NodeType, Owner, Priority};
    use argentor_graph::Constraints;

    #[test]
    fn round_trips_a_plan_and_its_root_node_through_the_store() {
        let store = Store::open_in_memory().unwrap();
        let plan = Plan {
            plan_id: PlanId::new(),
            title: "onboard vendor".into(),
            owner: Owner::Executor,
            root_task_id: TaskId::new(),
            created_at: argentor_core::utc_now(),
            constraints: Constraints { deadline: None, priority: Priority::High },
        };
        store.insert_plan(&plan).unwrap();

        let root = TaskNode::new(plan.plan_id, NodeType::Goal, "onboard vendor", Owner::Executor);
        store.insert_task_node(&root).unwrap();

        let fetched_plan = store.get_plan(plan.plan_id).unwrap();
        assert_eq!(fetched_plan.title, "onboard vendor");

        let nodes = store.list_task_nodes(plan.plan_id).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_type, NodeType::Goal);
    }
}
