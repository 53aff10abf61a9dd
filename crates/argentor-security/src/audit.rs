//! Append-only audit trail: status transitions recorded with a before/after
//! payload and, where one triggered the transition, the LLM call that
//! produced it.

use crate::error::SecurityResult;
use argentor_core::{AuditId, LlmCallId, TaskId};
use argentor_storage::{AuditEvent, Store};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

/// Stateless collaborator over [`Store`] that stamps every audit row with
/// an id and timestamp and mirrors it to the structured log. Takes `&Store`
/// per call rather than owning a connection: this engine's main loop
/// dispatches every round sequentially (see `engine.rs`'s divergence note),
/// so there's no concurrent-writer case to buffer behind a lock.
pub struct AuditLog;

impl AuditLog {
    /// Records a status transition, optionally tied to the LLM call that
    /// produced it, with a JSON before/after snapshot.
    pub fn log_transition(
        store: &Store,
        task_id: Option<TaskId>,
        llm_call_id: Option<LlmCallId>,
        action: impl Into<String>,
        before: Option<Value>,
        after: Option<Value>,
    ) -> SecurityResult<AuditId> {
        let action = action.into();
        let event = AuditEvent {
            audit_id: AuditId::new(),
            task_id,
            llm_call_id,
            action: action.clone(),
            before,
            after,
            created_at: Utc::now(),
        };

        info!(
            task_id = ?task_id,
            llm_call_id = ?llm_call_id,
            action = %action,
            "audit"
        );

        store.record_audit_event(&event)?;
        Ok(event.audit_id)
    }

    /// Full audit history for a task, oldest first.
    pub fn history(store: &Store, task_id: TaskId) -> SecurityResult<Vec<AuditEvent>> {
        Ok(store.list_audit_events(task_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::TaskId;
    use serde_json::json;

    #[test]
    fn records_a_status_transition_with_llm_call_reference() {
        let store = Store::open_in_memory().unwrap();
        let task_id = TaskId::new();
        let llm_call_id = LlmCallId::new();

        AuditLog::log_transition(
            &store,
            Some(task_id),
            Some(llm_call_id),
            "task.status_changed",
            Some(json!({"status": "RUNNING"})),
            Some(json!({"status": "DONE"})),
        )
        .unwrap();

        let history = AuditLog::history(&store, task_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "task.status_changed");
        assert_eq!(history[0].llm_call_id, Some(llm_call_id));
    }

    #[test]
    fn history_is_scoped_per_task_and_chronological() {
        let store = Store::open_in_memory().unwrap();
        let task_a = TaskId::new();
        let task_b = TaskId::new();

        AuditLog::log_transition(&store, Some(task_a), None, "a.first", None, None).unwrap();
        AuditLog::log_transition(&store, Some(task_b), None, "b.first", None, None).unwrap();
        AuditLog::log_transition(&store, Some(task_a), None, "a.second", None, None).unwrap();

        let history = AuditLog::history(&store, task_a).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, "a.first");
        assert_eq!(history[1].action, "a.second");
    }
}
