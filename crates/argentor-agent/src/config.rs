//! LLM provider configuration (spec §6 "LLM transport").

use serde::{Deserialize, Serialize};

/// Which provider a [`ModelConfig`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Claude,
    /// Any OpenAI-compatible `/v1/chat/completions` endpoint (OpenAI itself,
    /// or a compatible gateway pointed at via `api_base_url`).
    OpenAiCompatible,
}

/// Configuration for a single LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    pub api_key: String,
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_s() -> u64 {
    300
}

impl ModelConfig {
    /// The provider's default base URL, or the configured override.
    pub fn base_url(&self) -> &str {
        match &self.api_base_url {
            Some(url) => url,
            None => match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAiCompatible => "https://api.openai.com",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_provider_default_base_url() {
        let cfg = ModelConfig {
            provider: LlmProvider::Claude,
            model_id: "claude-opus".into(),
            api_key: "k".into(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_s: default_timeout_s(),
        };
        assert_eq!(cfg.base_url(), "https://api.anthropic.com");
    }

    #[test]
    fn honors_explicit_base_url_override() {
        let cfg = ModelConfig {
            provider: LlmProvider::OpenAiCompatible,
            model_id: "gpt".into(),
            api_key: "k".into(),
            api_base_url: Some("https://gateway.internal".into()),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_s: default_timeout_s(),
        };
        assert_eq!(cfg.base_url(), "https://gateway.internal");
    }
}
