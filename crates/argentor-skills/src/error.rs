use thiserror::Error;

/// Errors raised by a skill invocation, per the error taxonomy in spec §6/§7.
#[derive(Error, Debug)]
pub enum SkillError {
    /// Input was missing, unreadable, or of an unsupported shape
    /// (`SKILL_BAD_INPUT`).
    #[error("bad input for skill {skill}: {reason}")]
    BadInput { skill: &'static str, reason: String },

    /// The skill ran but failed for a reason that isn't the caller's fault
    /// (`SKILL_FAILED`).
    #[error("skill {skill} failed: {reason}")]
    Failed { skill: &'static str, reason: String },

    /// No skill is registered under that name.
    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("storage error: {0}")]
    Store(#[from] argentor_storage::StorageError),
}

pub type SkillResult<T> = Result<T, SkillError>;

impl From<SkillError> for argentor_core::AgentorError {
    fn from(err: SkillError) -> Self {
        match err {
            SkillError::Store(e) => e.into(),
            other => argentor_core::AgentorError::Skill(other.to_string()),
        }
    }
}
