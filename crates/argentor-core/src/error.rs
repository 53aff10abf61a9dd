use thiserror::Error;

/// A convenience `Result` alias using [`AgentorError`].
pub type AgentorResult<T> = Result<T, AgentorError>;

/// Top-level error type for the workflow engine.
///
/// Each variant corresponds to a subsystem that can produce errors; subsystem
/// crates define their own richer error enums and convert into this one at
/// the orchestrator/CLI boundary.
#[derive(Error, Debug)]
pub enum AgentorError {
    /// An error from the persistent store (SQLite-backed).
    #[error("storage error: {0}")]
    Storage(String),

    /// An error from the contract layer (normalization/validation).
    #[error("contract error: {0}")]
    Contract(String),

    /// An error from the task graph (readiness engine, scheduler).
    #[error("graph error: {0}")]
    Graph(String),

    /// An error from an LLM call.
    #[error("agent error: {0}")]
    Agent(String),

    /// An error from the plan workflow, review gate, rewriter, or deliverables picker.
    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    /// An error raised by a skill during invocation.
    #[error("skill error: {0}")]
    Skill(String),

    /// An error in configuration parsing or validation.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_subsystem_and_message() {
        let err = AgentorError::Storage("no such table: plans".into());
        assert_eq!(err.to_string(), "storage error: no such table: plans");
    }

    #[test]
    fn converts_from_json_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AgentorError = parse_err.into();
        assert!(matches!(err, AgentorError::Json(_)));
    }
}
