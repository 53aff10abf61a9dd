//! CLI-facing configuration: the `[model]` table of `agentor.toml`.
//!
//! [`argentor_orchestrator::RuntimeConfig`] already owns the budgets/
//! workspace fields of the same file and loads it independently (cached,
//! relative to the current directory — see its own doc comment). This
//! struct only reads the `model` table `RuntimeConfig` ignores, so both
//! loaders can point at the same `agentor.toml` without stepping on each
//! other.

use argentor_agent::{ClaudeBackend, FailoverBackend, LlmBackend, LlmProvider, ModelConfig, OpenAiBackend, RetryPolicy};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub model: ModelConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum CliConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read { path: String, source: std::io::Error },
    #[error("invalid config file '{path}': {source}")]
    Parse { path: String, source: toml::de::Error },
}

pub fn load(path: &Path) -> Result<CliConfig, CliConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliConfigError::Read { path: path.display().to_string(), source })?;
    toml::from_str(&text).map_err(|source| CliConfigError::Parse { path: path.display().to_string(), source })
}

/// Builds the `[model]`-configured backend, wrapped in a single-attempt
/// [`FailoverBackend`] so transient provider errors retry with backoff
/// the same way they would with more than one backend configured.
pub fn build_backend(model: ModelConfig) -> Arc<dyn LlmBackend> {
    let backend: Box<dyn LlmBackend> = match model.provider {
        LlmProvider::Claude => Box::new(ClaudeBackend::new(model)),
        LlmProvider::OpenAiCompatible => Box::new(OpenAiBackend::new(model)),
    };
    Arc::new(FailoverBackend::new(vec![backend], RetryPolicy::default()))
}
