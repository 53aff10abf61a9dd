//! Transport-level errors, converting into [`argentor_core::AgentorError`]
//! at the orchestrator boundary.

use thiserror::Error;

/// Errors raised while talking to an LLM provider.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The HTTP request itself failed (connection, TLS, timeout).
    #[error("http transport error: {0}")]
    Http(String),

    /// The provider responded with a non-2xx status.
    #[error("provider {provider} returned {status}: {body}")]
    ProviderStatus {
        /// `"anthropic"` or `"openai"`.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body didn't have the shape the backend expects
    /// (missing `content`/`choices`, wrong types).
    #[error("unexpected response shape from {provider}: {reason}")]
    UnexpectedShape {
        /// `"anthropic"` or `"openai"`.
        provider: &'static str,
        /// What was missing or malformed.
        reason: String,
    },

    /// Every backend in a [`crate::failover::FailoverBackend`] failed.
    #[error("all backends exhausted: {0}")]
    AllBackendsExhausted(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<AgentError> for argentor_core::AgentorError {
    fn from(err: AgentError) -> Self {
        argentor_core::AgentorError::Agent(err.to_string())
    }
}
