//! Retry-with-backoff and failover across backends, ported from the
//! teacher's `FailoverBackend`/`RetryPolicy`/`is_retryable` (dropping the
//! streaming half — this crate's trait has no `chat_stream`).

use crate::backend::LlmBackend;
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Retry behaviour for one backend before moving to the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff_base_ms: 500, backoff_max_ms: 30_000 }
    }
}

/// Transient (429/401/timeout/5xx) errors are worth retrying; a 4xx like
/// 400 bad request is not expected to succeed on retry.
pub fn is_retryable(err: &AgentError) -> bool {
    let msg = err.to_string().to_lowercase();
    if msg.contains("400") {
        return false;
    }
    msg.contains("429")
        || msg.contains("401")
        || msg.contains("timeout")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
}

fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    policy.backoff_base_ms.saturating_mul(2u64.saturating_pow(attempt)).min(policy.backoff_max_ms)
}

/// Tries each backend in order; within a backend, retries transient errors
/// up to `policy.max_retries` times with exponential backoff before moving
/// to the next backend.
pub struct FailoverBackend {
    backends: Vec<Box<dyn LlmBackend>>,
    policy: RetryPolicy,
}

impl FailoverBackend {
    /// # Panics
    /// Panics if `backends` is empty.
    pub fn new(backends: Vec<Box<dyn LlmBackend>>, policy: RetryPolicy) -> Self {
        assert!(!backends.is_empty(), "FailoverBackend requires at least one backend");
        Self { backends, policy }
    }
}

#[async_trait]
impl LlmBackend for FailoverBackend {
    async fn call(&self, prompt: &str) -> AgentResult<String> {
        let mut last_err: Option<AgentError> = None;

        for (backend_idx, backend) in self.backends.iter().enumerate() {
            for attempt in 0..=self.policy.max_retries {
                match backend.call(prompt).await {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        if !is_retryable(&e) {
                            warn!(backend = backend_idx, attempt, error = %e, "non-retryable error, moving to next backend");
                            last_err = Some(e);
                            break;
                        }
                        if attempt < self.policy.max_retries {
                            let delay = compute_backoff(&self.policy, attempt);
                            info!(backend = backend_idx, attempt, delay_ms = delay, error = %e, "retryable error, backing off");
                            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(AgentError::AllBackendsExhausted(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no backends configured".into()),
        ))
    }

    fn name(&self) -> &'static str {
        self.backends.first().map(|b| b.name()).unwrap_or("none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct MockBackend {
        results: Mutex<Vec<AgentResult<String>>>,
    }

    impl MockBackend {
        fn new(results: Vec<AgentResult<String>>) -> Self {
            Self { results: Mutex::new(results) }
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn call(&self, _prompt: &str) -> AgentResult<String> {
            let mut results = self.results.lock().await;
            if results.is_empty() {
                Err(AgentError::Http("MockBackend: no more results".into()))
            } else {
                results.remove(0)
            }
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy { max_retries: 3, backoff_base_ms: 0, backoff_max_ms: 0 }
    }

    #[tokio::test]
    async fn retry_succeeds_on_second_try() {
        let failover = FailoverBackend::new(
            vec![Box::new(MockBackend::new(vec![
                Err(AgentError::Http("429 Too Many Requests".into())),
                Ok("ok".into()),
            ]))],
            instant_policy(),
        );
        assert_eq!(failover.call("prompt").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn non_retryable_skips_to_next_backend() {
        let failover = FailoverBackend::new(
            vec![
                Box::new(MockBackend::new(vec![Err(AgentError::Http("400 Bad Request".into()))])),
                Box::new(MockBackend::new(vec![Ok("fallback ok".into())])),
            ],
            instant_policy(),
        );
        assert_eq!(failover.call("prompt").await.unwrap(), "fallback ok");
    }

    #[tokio::test]
    async fn all_backends_exhausted_surfaces_last_error() {
        let failover = FailoverBackend::new(
            vec![Box::new(MockBackend::new(vec![
                Err(AgentError::Http("503 Service Unavailable".into())),
                Err(AgentError::Http("503 Service Unavailable".into())),
                Err(AgentError::Http("503 Service Unavailable".into())),
                Err(AgentError::Http("503 Service Unavailable".into())),
            ]))],
            instant_policy(),
        );
        let err = failover.call("prompt").await.unwrap_err();
        assert!(matches!(err, AgentError::AllBackendsExhausted(_)));
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = RetryPolicy { max_retries: 5, backoff_base_ms: 500, backoff_max_ms: 30_000 };
        assert_eq!(compute_backoff(&policy, 0), 500);
        assert_eq!(compute_backoff(&policy, 3), 4000);
        assert_eq!(compute_backoff(&policy, 6), 30_000);
    }
}
