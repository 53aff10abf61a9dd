//! The `LlmBackend` trait every provider adapter implements.

use crate::error::AgentResult;
use async_trait::async_trait;

/// A minimal LLM transport: send a prompt, get back raw text.
///
/// Deliberately narrower than a full chat/tool-use API — the contract
/// layer only ever needs a single free-form prompt in, JSON-shaped text
/// out (spec §6: "a function taking a prompt string and returning
/// `{raw_text, parsed_json?, error_code?, provider, started_at,
/// finished_at}`").
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Sends `prompt` to the provider and returns the raw response text.
    async fn call(&self, prompt: &str) -> AgentResult<String>;

    /// A short provider label recorded on `llm_calls` rows (e.g.
    /// `"anthropic"`, `"openai"`).
    fn name(&self) -> &'static str;
}
