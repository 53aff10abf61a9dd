//! Record types for tables with no counterpart in `argentor_graph` (events,
//! LLM call log, audit trail) — these are storage/observability concerns,
//! not part of the task graph's own data model.

use argentor_core::{AuditId, EventId, InputFileId, LlmCallId, PlanId, PromptId, RequirementId, SkillRunId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry in the plan's event log (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_id: EventId,
    pub plan_id: PlanId,
    pub task_id: Option<TaskId>,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// A record of a single LLM round-trip (spec §6 observability).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCall {
    pub llm_call_id: LlmCallId,
    pub task_id: Option<TaskId>,
    pub provider: String,
    pub raw_text: Option<String>,
    pub parsed_json: Option<Value>,
    pub error_code: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single skill invocation (spec §6 "Skill runtime"), keyed by an
/// idempotency hash so cached successful runs can short-circuit re-invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRun {
    pub skill_run_id: SkillRunId,
    pub task_id: TaskId,
    pub skill_name: String,
    pub idempotency_key: Option<String>,
    pub input_hash: Option<String>,
    pub status: String,
    pub output_json: Option<Value>,
    pub error_code: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A named, versioned prompt template (spec §6 `prompt (list|show|set)`).
/// `(name, version)` is unique; the CLI's `prompt show` resolves the
/// highest version for a name unless one is given explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt_id: PromptId,
    pub name: String,
    pub version: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A file observed under a plan's `inputs/` directory (spec §2 "Input
/// file scanning"), tracked so a later disappearance can be reported as
/// `FILE_REMOVED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFile {
    pub input_file_id: InputFileId,
    pub plan_id: PlanId,
    pub path: String,
    pub sha256: String,
    pub discovered_at: DateTime<Utc>,
    pub bound_requirement_id: Option<RequirementId>,
}

/// A per-task, per-error-code occurrence counter (spec §2 "Error
/// counters"), incremented alongside each `ERROR` task event.
/// `(task_id, error_code)` is the primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCounter {
    pub task_id: TaskId,
    pub error_code: String,
    pub count: i64,
    pub last_seen_at: DateTime<Utc>,
}

/// An entry in the audit trail, cross-referencing an LLM call and a
/// before/after state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub audit_id: AuditId,
    pub task_id: Option<TaskId>,
    pub llm_call_id: Option<LlmCallId>,
    pub action: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub created_at: DateTime<Utc>,
}
