use crate::backend::LlmBackend;
use crate::config::ModelConfig;
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;

/// Talks to any OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn call(&self, prompt: &str) -> AgentResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
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
                provider: "openai",
                status: status.as_u16(),
                body: resp_body.to_string(),
            });
        }

        resp_body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentError::UnexpectedShape {
                provider: "openai",
                reason: "missing choices[0].message.content".into(),
            })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
