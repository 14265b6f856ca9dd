use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use agentdag_core::config::RetryConfig;
use agentdag_core::error::{DagError, Result};
use agentdag_core::traits::ChatClient;
use agentdag_core::types::ChatRequest;

/// A chat client that retries transient failures with exponential backoff.
pub struct RetryingClient {
    inner: Box<dyn ChatClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn ChatClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &DagError) -> bool {
    match e {
        DagError::LlmRequest(msg) | DagError::Http(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ChatClient for RetryingClient {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut attempt = 0;
            loop {
                match self.inner.chat(request.clone()).await {
                    Ok(text) => return Ok(text),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying chat request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails with the given error until `succeed_after` calls have been made.
    struct Flaky {
        calls: Arc<AtomicU32>,
        succeed_after: u32,
        error: fn() -> DagError,
    }

    impl ChatClient for Flaky {
        fn chat(&self, _request: ChatRequest) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n > self.succeed_after {
                    Ok("answer".to_string())
                } else {
                    Err((self.error)())
                }
            })
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            url: "http://localhost/v1/chat/completions".into(),
            method: "POST".into(),
            model: "m".into(),
            api_key: String::new(),
            messages: vec![],
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&DagError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&DagError::LlmRequest("connection reset".into())));
        assert!(!is_retryable(&DagError::LlmRequest("HTTP 401 Unauthorized".into())));
        assert!(!is_retryable(&DagError::LlmParse("bad json".into())));
    }

    #[test]
    fn test_backoff_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 2_000,
        };
        let first = calculate_backoff(0, &config);
        assert!(first >= Duration::from_millis(400) && first <= Duration::from_millis(600));
        let late = calculate_backoff(9, &config);
        assert!(late <= Duration::from_millis(2_400));
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: calls.clone(),
                succeed_after: 2,
                error: || DagError::LlmRequest("HTTP 503".into()),
            }),
            fast_retry(3),
        );
        assert_eq!(client.chat(request()).await.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: calls.clone(),
                succeed_after: 10,
                error: || DagError::LlmRequest("HTTP 500".into()),
            }),
            fast_retry(2),
        );
        assert!(client.chat(request()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: calls.clone(),
                succeed_after: 10,
                error: || DagError::LlmRequest("HTTP 401".into()),
            }),
            fast_retry(5),
        );
        assert!(client.chat(request()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
