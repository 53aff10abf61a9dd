//! Orchestrates a single LLM call end to end: send the prompt, attempt the
//! JSON repair pipeline on the raw text, and on total failure issue one
//! repair-prompt call to the same backend before giving up. Mirrors
//! `LLMClient.call_json`/`LLMCallResult` from the Python original this crate
//! was ported from.

use crate::backend::LlmBackend;
use crate::repair;
use argentor_core::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The full record of one logical `call_json` invocation, including the
/// extra repair-prompt call if one was needed. Maps onto an `llm_calls` row
/// plus the repair bookkeeping fields the original dataclass carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub prompt: String,
    pub raw_text: Option<String>,
    pub parsed_json: Option<serde_json::Value>,
    pub error_code: Option<ErrorCode>,
    pub error: Option<String>,
    pub provider: &'static str,
    /// Number of extra LLM calls beyond the first (0 or 1: one repair-prompt
    /// retry at most, no recursion).
    pub extra_calls: u32,
    pub repair_used: bool,
    pub repair_original_response: Option<String>,
}

/// Sends `prompt` to `backend`, then applies the JSON repair pipeline to
/// whatever text comes back. If every repair attempt fails, asks the same
/// backend once to rewrite its own output and retries the pipeline on that
/// response. Never recurses past that single repair attempt.
pub async fn call_json(backend: &dyn LlmBackend, prompt: &str) -> LlmCallResult {
    let started_at = Utc::now();
    let provider = backend.name();

    let raw_text = match backend.call(prompt).await {
        Ok(text) => text,
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            let error_code =
                if msg.contains("timeout") { ErrorCode::LlmTimeout } else { ErrorCode::LlmFailed };
            return LlmCallResult {
                started_at,
                finished_at: Utc::now(),
                prompt: prompt.to_string(),
                raw_text: None,
                parsed_json: None,
                error_code: Some(error_code),
                error: Some(e.to_string()),
                provider,
                extra_calls: 0,
                repair_used: false,
                repair_original_response: None,
            };
        }
    };

    if let Ok(parsed) = repair::parse_with_repairs(&raw_text) {
        return LlmCallResult {
            started_at,
            finished_at: Utc::now(),
            prompt: prompt.to_string(),
            raw_text: Some(raw_text),
            parsed_json: Some(parsed),
            error_code: None,
            error: None,
            provider,
            extra_calls: 0,
            repair_used: false,
            repair_original_response: None,
        };
    }

    if repair::looks_like_refusal(&raw_text) {
        return LlmCallResult {
            started_at,
            finished_at: Utc::now(),
            prompt: prompt.to_string(),
            raw_text: Some(raw_text),
            parsed_json: None,
            error_code: Some(ErrorCode::LlmRefusal),
            error: Some("model refused the request".to_string()),
            provider,
            extra_calls: 0,
            repair_used: false,
            repair_original_response: None,
        };
    }

    let repair_prompt = repair::build_json_repair_prompt(&raw_text);
    let repair_response = backend.call(&repair_prompt).await;

    match repair_response {
        Ok(repaired_raw) => match repair::parse_with_repairs(&repaired_raw) {
            Ok(parsed) => LlmCallResult {
                started_at,
                finished_at: Utc::now(),
                prompt: prompt.to_string(),
                raw_text: Some(repaired_raw),
                parsed_json: Some(parsed),
                error_code: None,
                error: None,
                provider,
                extra_calls: 1,
                repair_used: true,
                repair_original_response: Some(raw_text),
            },
            Err(e) => LlmCallResult {
                started_at,
                finished_at: Utc::now(),
                prompt: prompt.to_string(),
                raw_text: Some(repaired_raw),
                parsed_json: None,
                error_code: Some(ErrorCode::LlmUnparseable),
                error: Some(e),
                provider,
                extra_calls: 1,
                repair_used: true,
                repair_original_response: Some(raw_text),
            },
        },
        Err(e) => LlmCallResult {
            started_at,
            finished_at: Utc::now(),
            prompt: prompt.to_string(),
            raw_text: Some(raw_text.clone()),
            parsed_json: None,
            error_code: Some(ErrorCode::LlmUnparseable),
            error: Some(e.to_string()),
            provider,
            extra_calls: 1,
            repair_used: false,
            repair_original_response: Some(raw_text),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, AgentResult};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<AgentResult<String>>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<AgentResult<String>>) -> Self {
            Self { responses: Mutex::new(responses) }
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn call(&self, _prompt: &str) -> AgentResult<String> {
            self.responses.lock().await.remove(0)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn well_formed_json_needs_no_repair() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"result_type": "NOOP"}"#.to_string())]);
        let result = call_json(&backend, "do the thing").await;
        assert!(result.error_code.is_none());
        assert!(!result.repair_used);
        assert_eq!(result.extra_calls, 0);
        assert_eq!(result.parsed_json.unwrap()["result_type"], "NOOP");
    }

    #[tokio::test]
    async fn unparseable_text_triggers_one_repair_round() {
        let backend = ScriptedBackend::new(vec![
            Ok("not json at all, sorry".to_string()),
            Ok(r#"{"result_type": "NOOP"}"#.to_string()),
        ]);
        let result = call_json(&backend, "do the thing").await;
        assert!(result.repair_used);
        assert_eq!(result.extra_calls, 1);
        assert_eq!(result.parsed_json.unwrap()["result_type"], "NOOP");
        assert_eq!(result.repair_original_response.unwrap(), "not json at all, sorry");
    }

    #[tokio::test]
    async fn refusal_is_classified_without_spending_a_repair_call() {
        let backend =
            ScriptedBackend::new(vec![Ok("I'm sorry, I can't help with that request.".to_string())]);
        let result = call_json(&backend, "do the thing").await;
        assert_eq!(result.error_code, Some(ErrorCode::LlmRefusal));
        assert_eq!(result.extra_calls, 0);
    }

    #[tokio::test]
    async fn repair_round_that_also_fails_is_unparseable() {
        let backend = ScriptedBackend::new(vec![
            Ok("still not json".to_string()),
            Ok("still not json, second try".to_string()),
        ]);
        let result = call_json(&backend, "do the thing").await;
        assert_eq!(result.error_code, Some(ErrorCode::LlmUnparseable));
        assert_eq!(result.extra_calls, 1);
    }

    #[tokio::test]
    async fn transport_failure_on_first_call_is_llm_failed() {
        let backend = ScriptedBackend::new(vec![Err(AgentError::Http("connection reset".into()))]);
        let result = call_json(&backend, "do the thing").await;
        assert_eq!(result.error_code, Some(ErrorCode::LlmFailed));
        assert!(result.raw_text.is_none());
    }

    #[tokio::test]
    async fn transport_timeout_on_first_call_is_llm_timeout() {
        let backend = ScriptedBackend::new(vec![Err(AgentError::Http("request timeout".into()))]);
        let result = call_json(&backend, "do the thing").await;
        assert_eq!(result.error_code, Some(ErrorCode::LlmTimeout));
    }
}
