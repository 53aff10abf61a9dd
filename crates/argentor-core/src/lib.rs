//! Core error taxonomy, opaque ids, and shared vocabulary for the workflow
//! engine. Every other crate in the workspace depends on this one; it has
//! no internal dependencies of its own.

mod error;
mod error_code;
mod ids;
mod time;
mod vocabulary;

pub use error::{AgentorError, AgentorResult};
pub use error_code::{ErrorBand, ErrorCode};
pub use ids::{
    ApprovalId, ArtifactId, AuditId, EdgeId, EventId, EvidenceId, InputFileId, LlmCallId, PlanId,
    PromptId, RequirementId, ReviewId, SkillRunId, TaskId,
};
pub use time::{parse_iso8601, utc_now, utc_now_iso};
pub use vocabulary::{
    AndOr, ArtifactFormat, BlockedReason, EdgeType, NodeType, Owner, Priority, RequirementKind,
    RequirementSource, TaskStatus, Verdict,
};
