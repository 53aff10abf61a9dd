//! The bounded main loop (spec §5/§9): recompute readiness, pick a
//! runnable batch, run one executor round per ready ACTION and one review
//! round per ready CHECK, and repeat until the graph converges or a
//! budget from `RuntimeConfig` runs out. Grounded on `run.py`'s top-level
//! driver loop, generalized from its async-parallel batch dispatch to a
//! single sequential pass per round — see this module's DESIGN.md entry
//! for why.

use crate::config::RuntimeConfig;
use crate::errors_runtime::{maybe_reset_failed_to_ready, set_status};
use crate::error::OrchestratorResult;
use crate::executor::run_executor_once;
use crate::readiness::recompute_readiness_for_plan;
use crate::reporting::{is_plan_blocked_waiting_user, write_blocked_summary};
use crate::review_gate::run_check_once;
use argentor_agent::LlmBackend;
use argentor_core::{PlanId, TaskId};
use argentor_graph::{next_runnable, TaskNode};
use argentor_skills::SkillRegistry;
use argentor_storage::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Callback for progress updates emitted between rounds.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Why [`Orchestrator::run_plan`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left to run and the last readiness pass made no changes —
    /// the plan either finished or is quiescent waiting on external input.
    /// In the latter case `run_plan` has already written
    /// `required_docs/blocked_summary.md` before returning.
    Converged,
    LlmCallBudgetExhausted,
    TimeBudgetExhausted,
}

/// What one [`Orchestrator::run_plan`] call did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub rounds: u32,
    pub llm_calls: u32,
    pub executor_outcomes: usize,
    pub check_outcomes: usize,
    pub readiness_changes: usize,
    pub input_files_discovered: usize,
    pub input_files_removed: usize,
    pub stop_reason: Option<StopReason>,
}

/// Owns the storage handle, skill registry, and LLM backend a plan's
/// rounds run against.
pub struct Orchestrator {
    store: Store,
    skills: Arc<SkillRegistry>,
    backend: Arc<dyn LlmBackend>,
    workspace_root: PathBuf,
    on_progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(store: Store, skills: Arc<SkillRegistry>, backend: Arc<dyn LlmBackend>, workspace_root: PathBuf) -> Self {
        Self { store, skills, backend, workspace_root, on_progress: None }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn emit(&self, msg: &str) {
        if let Some(cb) = &self.on_progress {
            cb(msg);
        }
    }

    /// Drives `plan_id` until it converges or a `RuntimeConfig` budget is
    /// exhausted. Assumes the plan's graph is already persisted (i.e.
    /// [`crate::generate_and_review_plan`] has already run).
    pub async fn run_plan(&self, plan_id: PlanId) -> OrchestratorResult<RunSummary> {
        let cfg = RuntimeConfig::get()?;
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let batch_limit = cfg.executor_batch_size.max(cfg.check_batch_size);

        loop {
            if summary.llm_calls >= cfg.max_llm_calls_per_run {
                summary.stop_reason = Some(StopReason::LlmCallBudgetExhausted);
                break;
            }
            if started.elapsed().as_secs() >= cfg.plan_runtime_seconds_budget {
                summary.stop_reason = Some(StopReason::TimeBudgetExhausted);
                break;
            }

            summary.input_files_discovered += crate::input_scan::scan_inputs(&self.store, plan_id, &self.workspace_root.join("inputs"))?;
            summary.input_files_removed += crate::input_scan::detect_removed_inputs(&self.store, plan_id)?;

            maybe_reset_failed_to_ready(&self.store, plan_id, cfg.failed_auto_reset_ready)?;

            let readiness_changes = recompute_readiness_for_plan(&self.store, plan_id)?;
            summary.readiness_changes += readiness_changes;
            summary.rounds += 1;

            let nodes: HashMap<TaskId, TaskNode> =
                self.store.list_task_nodes(plan_id)?.into_iter().map(|n| (n.task_id, n)).collect();
            let batch = next_runnable(&nodes, batch_limit);

            if batch.executor_actions.is_empty() && batch.check_gate.is_empty() {
                if readiness_changes == 0 {
                    let node_list: Vec<TaskNode> = nodes.into_values().collect();
                    if is_plan_blocked_waiting_user(&node_list) {
                        let path = write_blocked_summary(&self.store, plan_id, &self.workspace_root)?;
                        info!(plan_id = %plan_id, path = %path.display(), "wrote blocked summary");
                    }
                    summary.stop_reason = Some(StopReason::Converged);
                    break;
                }
                continue;
            }

            for task_id in batch.executor_actions.iter().take(cfg.executor_batch_size) {
                self.emit(&format!("executor round: {task_id}"));
                info!(plan_id = %plan_id, task_id = %task_id, "executor round");
                run_executor_once(&self.store, &self.skills, plan_id, *task_id, self.backend.as_ref(), &self.workspace_root).await?;
                summary.executor_outcomes += 1;
                summary.llm_calls += 1;
            }

            for task_id in batch.check_gate.iter().take(cfg.check_batch_size) {
                self.emit(&format!("check round: {task_id}"));
                info!(plan_id = %plan_id, task_id = %task_id, "check round");
                run_check_once(&self.store, plan_id, *task_id, self.backend.as_ref()).await?;
                summary.check_outcomes += 1;
                summary.llm_calls += 1;
            }
        }

        Ok(summary)
    }

    /// Marks `task_id` TO_BE_MODIFY so the next `run_plan` call re-runs
    /// its executor round, per the rewriter's patch-application step.
    pub fn requeue_for_rework(&self, plan_id: PlanId, task_id: TaskId) -> OrchestratorResult<()> {
        set_status(&self.store, plan_id, task_id, argentor_core::TaskStatus::ToBeModify, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_agent::AgentResult;
    use argentor_core::{NodeType, Owner, Priority, TaskStatus};
    use argentor_graph::{Constraints, Plan};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<AgentResult<String>>>,
    }
    impl ScriptedBackend {
        fn new(responses: Vec<AgentResult<String>>) -> Self {
            Self { responses: Mutex::new(responses) }
        }
    }
    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn call(&self, _prompt: &str) -> AgentResult<String> {
            self.responses.lock().await.remove(0)
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn seed_plan(store: &Store) -> PlanId {
        let root_id = TaskId::new();
        let plan = Plan {
            plan_id: PlanId::new(),
            title: "demo".into(),
            owner: Owner::Executor,
            root_task_id: root_id,
            created_at: Utc::now(),
            constraints: Constraints { deadline: None, priority: Priority::Med },
        };
        store.insert_plan(&plan).unwrap();
        let mut root = TaskNode::new(plan.plan_id, NodeType::Goal, "root", Owner::Executor);
        root.task_id = root_id;
        store.insert_task_node(&root).unwrap();
        plan.plan_id
    }

    #[tokio::test]
    async fn converges_immediately_when_the_plan_has_no_runnable_nodes() {
        RuntimeConfig::reset_for_test();
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let orchestrator = Orchestrator::new(store, Arc::new(SkillRegistry::new()), backend, PathBuf::from("."));

        let summary = orchestrator.run_plan(plan_id).await.unwrap();
        assert_eq!(summary.stop_reason, Some(StopReason::Converged));
        assert_eq!(summary.executor_outcomes, 0);
    }

    #[tokio::test]
    async fn runs_a_ready_action_to_ready_to_check() {
        RuntimeConfig::reset_for_test();
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let action = TaskNode::new(plan_id, NodeType::Action, "write report", Owner::Executor);
        let action_id = action.task_id;
        store.insert_task_node(&action).unwrap();

        let artifact_payload = json!({
            "schema_version": "task_action_v1",
            "task_id": "x",
            "result_type": "ARTIFACT",
            "artifact": {"name": "report", "format": "md", "content": "# Report\nDone."},
        })
        .to_string();
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(artifact_payload)]));
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(store, Arc::new(SkillRegistry::new()), backend, tmp.path().to_path_buf());

        let summary = orchestrator.run_plan(plan_id).await.unwrap();
        assert_eq!(summary.stop_reason, Some(StopReason::Converged));
        assert_eq!(summary.executor_outcomes, 1);
        let action = orchestrator.store().get_task_node(action_id).unwrap();
        assert_eq!(action.status, TaskStatus::ReadyToCheck);
    }

    #[tokio::test]
    async fn converging_blocked_waiting_input_writes_a_blocked_summary() {
        RuntimeConfig::reset_for_test();
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let mut action = TaskNode::new(plan_id, NodeType::Action, "needs a file", Owner::Executor);
        action.status = TaskStatus::Blocked;
        action.blocked_reason = Some(argentor_core::BlockedReason::WaitingInput);
        store.insert_task_node(&action).unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(store, Arc::new(SkillRegistry::new()), backend, tmp.path().to_path_buf());

        let summary = orchestrator.run_plan(plan_id).await.unwrap();
        assert_eq!(summary.stop_reason, Some(StopReason::Converged));

        let path = tmp.path().join("required_docs").join("blocked_summary.md");
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Blocked Summary"));
        assert!(text.contains("needs a file"));
        assert!(text.contains("WAITING_INPUT"));
    }

    #[tokio::test]
    async fn failed_auto_reset_ready_clears_failed_nodes_before_converging() {
        RuntimeConfig::reset_for_test();
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let mut action = TaskNode::new(plan_id, NodeType::Action, "flaky", Owner::Executor);
        action.status = TaskStatus::Failed;
        store.insert_task_node(&action).unwrap();
        let action_id = action.task_id;

        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(store, Arc::new(SkillRegistry::new()), backend, tmp.path().to_path_buf());

        orchestrator.run_plan(plan_id).await.unwrap();
        let action = orchestrator.store().get_task_node(action_id).unwrap();
        assert_eq!(action.status, TaskStatus::Failed, "disabled by default");
    }
}
