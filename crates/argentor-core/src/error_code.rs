//! The error taxonomy consumed by readers (spec §6/§7): a closed set of
//! machine-readable codes attached to `task_events` ERROR rows and to
//! `ContractError`/review-gate failures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A machine-readable error code from the taxonomy in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LlmUnparseable,
    LlmTimeout,
    LlmFailed,
    LlmRefusal,
    SkillFailed,
    SkillTimeout,
    SkillBadInput,
    InputMissing,
    InputConflict,
    ContractMismatch,
    StaleReview,
    ReviewerFailed,
    ReviewerBadOutput,
    MaxAttemptsExceeded,
    PlanTimeout,
    MaxLlmCallsExceeded,
    TaskNotFound,
    UnknownContract,
    SchemaMismatch,
}

impl ErrorCode {
    /// Error band per spec §7: transient errors consume attempt budget,
    /// input-dependent errors block without consuming attempts, and
    /// contract/structural errors retry within the CHECK attempt budget.
    pub fn band(self) -> ErrorBand {
        use ErrorBand::*;
        use ErrorCode::*;
        match self {
            LlmUnparseable | LlmTimeout | SkillTimeout => Transient,
            InputMissing | InputConflict | SkillBadInput => InputDependent,
            ContractMismatch | StaleReview | ReviewerBadOutput => ContractStructural,
            _ => ContractStructural,
        }
    }
}

/// The three error bands from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBand {
    /// Increments the task's attempt counter; at budget the task transitions
    /// terminally (FAILED for executor, BLOCKED WAITING_EXTERNAL for
    /// reviewer/skill).
    Transient,
    /// Transitions BLOCKED with a blocked_reason; does not consume attempts.
    InputDependent,
    /// Retries within the CHECK attempt budget, then escalates to BLOCKED
    /// WAITING_EXTERNAL.
    ContractStructural,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::LlmUnparseable => "LLM_UNPARSEABLE",
            ErrorCode::LlmTimeout => "LLM_TIMEOUT",
            ErrorCode::LlmFailed => "LLM_FAILED",
            ErrorCode::LlmRefusal => "LLM_REFUSAL",
            ErrorCode::SkillFailed => "SKILL_FAILED",
            ErrorCode::SkillTimeout => "SKILL_TIMEOUT",
            ErrorCode::SkillBadInput => "SKILL_BAD_INPUT",
            ErrorCode::InputMissing => "INPUT_MISSING",
            ErrorCode::InputConflict => "INPUT_CONFLICT",
            ErrorCode::ContractMismatch => "CONTRACT_MISMATCH",
            ErrorCode::StaleReview => "STALE_REVIEW",
            ErrorCode::ReviewerFailed => "REVIEWER_FAILED",
            ErrorCode::ReviewerBadOutput => "REVIEWER_BAD_OUTPUT",
            ErrorCode::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
            ErrorCode::PlanTimeout => "PLAN_TIMEOUT",
            ErrorCode::MaxLlmCallsExceeded => "MAX_LLM_CALLS_EXCEEDED",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::UnknownContract => "UNKNOWN_CONTRACT",
            ErrorCode::SchemaMismatch => "SCHEMA_MISMATCH",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_consume_attempts() {
        assert_eq!(ErrorCode::LlmTimeout.band(), ErrorBand::Transient);
        assert_eq!(ErrorCode::SkillTimeout.band(), ErrorBand::Transient);
    }

    #[test]
    fn input_dependent_codes_do_not_consume_attempts() {
        assert_eq!(ErrorCode::InputMissing.band(), ErrorBand::InputDependent);
        assert_eq!(ErrorCode::InputConflict.band(), ErrorBand::InputDependent);
    }
}
