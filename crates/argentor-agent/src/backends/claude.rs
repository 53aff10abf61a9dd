use crate::backend::LlmBackend;
use crate::config::ModelConfig;
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use serde::Serialize;

/// Talks to the Anthropic Messages API.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn call(&self, prompt: &str) -> AgentResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [ClaudeMessage { role: "user", content: prompt }],
        });

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(std::time::Duration::from_secs(self.config.timeout_s))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value =
            resp.json().await.map_err(|e| AgentError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(AgentError::ProviderStatus {
                provider: "anthropic",
                status: status.as_u16(),
                body: resp_body.to_string(),
            });
        }

        let content = resp_body["content"].as_array().ok_or_else(|| AgentError::UnexpectedShape {
            provider: "anthropic",
            reason: "missing content array".into(),
        })?;

        let text: String = content
            .iter()
            .filter(|block| block["type"].as_str() == Some("text"))
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
