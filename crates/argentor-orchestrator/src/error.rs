//! Orchestrator-local error taxonomy, following the same one-variant-per-
//! failure-family shape as [`argentor_core::AgentorError`] and converting
//! into it at the CLI boundary.

use thiserror::Error;

/// Errors raised by the plan workflow, review gate, rewriter, or
/// deliverables picker/export.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// PLAN_GEN/PLAN_REVIEW did not converge within the configured attempt
    /// budgets (spec §4.2).
    #[error("plan workflow did not converge for {top_task:?} after {attempts} attempt(s): {reason}")]
    PlanWorkflow { top_task: String, attempts: u32, reason: String },

    /// No approved artifact exists to export as a final deliverable (spec
    /// §4.8).
    #[error("no final deliverable available for plan {plan_id}: {hint}")]
    NoFinalDeliverable { plan_id: String, hint: String },

    /// A rewrite patch referenced a node that no longer exists.
    #[error("rewrite target not found: {0}")]
    RewriteTargetNotFound(String),

    /// The runtime configuration file was invalid.
    #[error("runtime config error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] argentor_storage::StorageError),

    #[error(transparent)]
    Agent(#[from] argentor_agent::AgentError),

    #[error(transparent)]
    Skill(#[from] argentor_skills::SkillError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for orchestrator results.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<OrchestratorError> for argentor_core::AgentorError {
    fn from(err: OrchestratorError) -> Self {
        argentor_core::AgentorError::Orchestrator(err.to_string())
    }
}
