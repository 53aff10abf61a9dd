//! Error-code to task-state mapping (spec §7) and the ERROR/STATUS_CHANGED
//! event+audit trail every failure path in this crate writes through.
//! Grounded on `core/errors.py`'s `record_error`/`apply_error_outcome`/
//! `map_error_to_outcome`.

use crate::error::OrchestratorResult;
use argentor_core::{utc_now, BlockedReason, ErrorCode, EventId, PlanId, TaskId, TaskStatus};
use argentor_security::AuditLog;
use argentor_storage::{Store, TaskEvent};
use serde_json::{json, Value};

/// The status/blocked_reason/attempt_delta one error code maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorOutcome {
    pub status: Option<TaskStatus>,
    pub blocked_reason: Option<BlockedReason>,
    pub attempt_delta: i32,
}

/// Maps an [`ErrorCode`] to the task transition it causes, independent of
/// which round raised it.
pub fn map_error_to_outcome(code: ErrorCode) -> ErrorOutcome {
    use ErrorCode::*;
    match code {
        LlmUnparseable | LlmTimeout | LlmFailed => {
            ErrorOutcome { status: Some(TaskStatus::Failed), blocked_reason: None, attempt_delta: 1 }
        }
        LlmRefusal => ErrorOutcome {
            status: Some(TaskStatus::Blocked),
            blocked_reason: Some(BlockedReason::WaitingExternal),
            attempt_delta: 0,
        },
        SkillFailed | SkillTimeout => ErrorOutcome {
            status: Some(TaskStatus::Blocked),
            blocked_reason: Some(BlockedReason::WaitingSkill),
            attempt_delta: 0,
        },
        SkillBadInput | InputMissing => ErrorOutcome {
            status: Some(TaskStatus::Blocked),
            blocked_reason: Some(BlockedReason::WaitingInput),
            attempt_delta: 0,
        },
        InputConflict | MaxAttemptsExceeded => ErrorOutcome {
            status: Some(TaskStatus::Blocked),
            blocked_reason: Some(BlockedReason::WaitingExternal),
            attempt_delta: 0,
        },
        _ => ErrorOutcome { status: Some(TaskStatus::Failed), blocked_reason: None, attempt_delta: 1 },
    }
}

/// Records an `ERROR` task event, bumps that task's per-error-code
/// counter (spec §2 "Error counters"), plus a best-effort audit row.
/// Never fails the caller's flow on the audit write.
pub fn record_error(
    store: &Store,
    plan_id: PlanId,
    task_id: Option<TaskId>,
    error_code: ErrorCode,
    message: &str,
    context: Value,
) -> OrchestratorResult<()> {
    let now = utc_now();
    store.record_event(&TaskEvent {
        event_id: EventId::new(),
        plan_id,
        task_id,
        event_type: "ERROR".to_string(),
        payload: json!({"error_code": error_code.to_string(), "message": message, "context": context}),
        created_at: now,
    })?;
    if let Some(task_id) = task_id {
        store.increment_error_counter(task_id, &error_code.to_string(), now)?;
    }
    let _ = AuditLog::log_transition(store, task_id, None, format!("ERROR_{error_code}"), None, Some(json!({"message": message})));
    Ok(())
}

/// Applies `outcome` to `task_id`: bumps `attempt_count`, and when the
/// outcome names a status, transitions and emits `STATUS_CHANGED`.
pub fn apply_error_outcome(store: &Store, plan_id: PlanId, task_id: TaskId, outcome: ErrorOutcome) -> OrchestratorResult<()> {
    let mut node = store.get_task_node(task_id)?;
    if outcome.attempt_delta != 0 {
        node.attempt_count += outcome.attempt_delta;
    }
    if let Some(status) = outcome.status {
        node.status = status;
        node.blocked_reason = outcome.blocked_reason;
        store.update_task_node(&node)?;
        store.record_event(&TaskEvent {
            event_id: EventId::new(),
            plan_id,
            task_id: Some(task_id),
            event_type: "STATUS_CHANGED".to_string(),
            payload: json!({"status": status.to_string(), "blocked_reason": outcome.blocked_reason.map(|b| b.to_string())}),
            created_at: utc_now(),
        })?;
    } else {
        store.update_task_node(&node)?;
    }
    Ok(())
}

/// Plain status transition (not derived from an error code), emitting the
/// same `STATUS_CHANGED` event `apply_error_outcome` does.
pub fn set_status(
    store: &Store,
    plan_id: PlanId,
    task_id: TaskId,
    status: TaskStatus,
    blocked_reason: Option<BlockedReason>,
) -> OrchestratorResult<()> {
    let mut node = store.get_task_node(task_id)?;
    node.status = status;
    node.blocked_reason = blocked_reason;
    store.update_task_node(&node)?;
    store.record_event(&TaskEvent {
        event_id: EventId::new(),
        plan_id,
        task_id: Some(task_id),
        event_type: "STATUS_CHANGED".to_string(),
        payload: json!({"status": status.to_string(), "blocked_reason": blocked_reason.map(|b| b.to_string())}),
        created_at: utc_now(),
    })?;
    Ok(())
}

/// Bumps `attempt_count` by one without touching status.
pub fn increment_attempt(store: &Store, task_id: TaskId) -> OrchestratorResult<i32> {
    let mut node = store.get_task_node(task_id)?;
    node.attempt_count += 1;
    let count = node.attempt_count;
    store.update_task_node(&node)?;
    Ok(count)
}

/// Conservative recovery pass (spec §7, config-gated): every active-branch
/// `FAILED` node is reset to `READY` with its `blocked_reason` cleared,
/// leaving `attempt_count` and evidence history untouched. A no-op when
/// `enabled` is false. Grounded on `core/errors.py`'s
/// `maybe_reset_failed_to_ready`, called once per round before readiness
/// recompute so a reset node is immediately eligible for re-selection.
/// Returns the number of nodes reset.
pub fn maybe_reset_failed_to_ready(store: &Store, plan_id: PlanId, enabled: bool) -> OrchestratorResult<usize> {
    if !enabled {
        return Ok(0);
    }
    let mut reset = 0;
    for mut node in store
        .list_task_nodes(plan_id)?
        .into_iter()
        .filter(|n| n.active_branch && n.status == TaskStatus::Failed)
    {
        node.status = TaskStatus::Ready;
        node.blocked_reason = None;
        store.update_task_node(&node)?;
        store.record_event(&TaskEvent {
            event_id: EventId::new(),
            plan_id,
            task_id: Some(node.task_id),
            event_type: "STATUS_CHANGED".to_string(),
            payload: json!({"status": TaskStatus::Ready.to_string(), "blocked_reason": Value::Null}),
            created_at: utc_now(),
        })?;
        reset += 1;
    }
    Ok(reset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{NodeType, Owner, Priority};
    use argentor_graph::{Constraints, Plan, TaskNode};
    use chrono::Utc;

    fn seed(store: &Store) -> (PlanId, TaskId) {
        let root_id = TaskId::new();
        let plan = Plan {
            plan_id: PlanId::new(),
            title: "p".into(),
            owner: Owner::Executor,
            root_task_id: root_id,
            created_at: Utc::now(),
            constraints: Constraints { deadline: None, priority: Priority::Med },
        };
        store.insert_plan(&plan).unwrap();
        let mut node = TaskNode::new(plan.plan_id, NodeType::Action, "draft", Owner::Executor);
        node.task_id = root_id;
        store.insert_task_node(&node).unwrap();
        (plan.plan_id, root_id)
    }

    #[test]
    fn input_missing_blocks_waiting_input_without_consuming_attempts() {
        let outcome = map_error_to_outcome(ErrorCode::InputMissing);
        assert_eq!(outcome.status, Some(TaskStatus::Blocked));
        assert_eq!(outcome.blocked_reason, Some(BlockedReason::WaitingInput));
        assert_eq!(outcome.attempt_delta, 0);
    }

    #[test]
    fn llm_failed_fails_the_task_and_spends_an_attempt() {
        let outcome = map_error_to_outcome(ErrorCode::LlmFailed);
        assert_eq!(outcome.status, Some(TaskStatus::Failed));
        assert_eq!(outcome.attempt_delta, 1);
    }

    #[test]
    fn apply_error_outcome_updates_status_and_emits_event() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, task_id) = seed(&store);
        apply_error_outcome(&store, plan_id, task_id, map_error_to_outcome(ErrorCode::InputConflict)).unwrap();
        let node = store.get_task_node(task_id).unwrap();
        assert_eq!(node.status, TaskStatus::Blocked);
        assert_eq!(node.blocked_reason, Some(BlockedReason::WaitingExternal));
        let events = store.list_events(plan_id).unwrap();
        assert!(events.iter().any(|e| e.event_type == "STATUS_CHANGED"));
    }

    #[test]
    fn record_error_writes_an_error_event() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, task_id) = seed(&store);
        record_error(&store, plan_id, Some(task_id), ErrorCode::InputMissing, "missing doc", json!({})).unwrap();
        let events = store.list_events(plan_id).unwrap();
        assert!(events.iter().any(|e| e.event_type == "ERROR"));
    }

    #[test]
    fn record_error_increments_the_task_error_counter() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, task_id) = seed(&store);
        record_error(&store, plan_id, Some(task_id), ErrorCode::LlmTimeout, "timed out", json!({})).unwrap();
        record_error(&store, plan_id, Some(task_id), ErrorCode::LlmTimeout, "timed out again", json!({})).unwrap();
        let count = store.get_error_counter(task_id, &ErrorCode::LlmTimeout.to_string()).unwrap();
        assert_eq!(count, Some(2));
    }

    #[test]
    fn maybe_reset_failed_to_ready_is_a_no_op_when_disabled() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, task_id) = seed(&store);
        apply_error_outcome(&store, plan_id, task_id, map_error_to_outcome(ErrorCode::LlmFailed)).unwrap();

        let reset = maybe_reset_failed_to_ready(&store, plan_id, false).unwrap();
        assert_eq!(reset, 0);
        let node = store.get_task_node(task_id).unwrap();
        assert_eq!(node.status, TaskStatus::Failed);
    }

    #[test]
    fn maybe_reset_failed_to_ready_clears_failed_nodes_when_enabled() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, task_id) = seed(&store);
        apply_error_outcome(&store, plan_id, task_id, map_error_to_outcome(ErrorCode::LlmFailed)).unwrap();

        let reset = maybe_reset_failed_to_ready(&store, plan_id, true).unwrap();
        assert_eq!(reset, 1);
        let node = store.get_task_node(task_id).unwrap();
        assert_eq!(node.status, TaskStatus::Ready);
        assert_eq!(node.blocked_reason, None);

        let events = store.list_events(plan_id).unwrap();
        assert!(events.iter().any(|e| e.event_type == "STATUS_CHANGED" && e.payload["status"] == "READY"));
    }
}
