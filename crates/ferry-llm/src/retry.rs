use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::warn;

use ferry_core::config::{ModelConfig, RetryConfig};
use ferry_core::error::{FerryError, Result};
use ferry_core::traits::ChatClient;
use ferry_core::types::*;

/// A chat client that retries failed requests with jittered exponential
/// backoff. Only opening the stream is retried; a stream that fails midway
/// surfaces its error to the caller.
pub struct RetryingClient {
    inner: Arc<dyn ChatClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ChatClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

fn is_retryable(e: &FerryError) -> bool {
    match e {
        FerryError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        FerryError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ChatClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut attempt = 0;
            loop {
                match self.inner.chat_stream(&config, messages.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
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
    use ferry_test_utils::{test_model_config, MockChatClient};
    use futures::StreamExt;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&FerryError::LlmRequest("HTTP 503: busy".into())));
        assert!(is_retryable(&FerryError::LlmStream("reset".into())));
        assert!(!is_retryable(&FerryError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&FerryError::Cancelled));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let first = calculate_backoff(0, &config);
        assert!(first >= Duration::from_millis(800) && first <= Duration::from_millis(1200));
        let late = calculate_backoff(9, &config);
        assert!(late <= Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mock = MockChatClient::new()
            .with_error("HTTP 429: slow down")
            .with_reply("done");
        let client = RetryingClient::new(Arc::new(mock), fast_retry(2));

        let stream = client
            .chat_stream(&test_model_config(), vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        let deltas: Vec<_> = stream.collect().await;
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "done"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned() {
        let mock = MockChatClient::new()
            .with_error("HTTP 401: unauthorized")
            .with_reply("never");
        let client = RetryingClient::new(Arc::new(mock), fast_retry(3));

        let err = client
            .chat_stream(&test_model_config(), vec![ChatMessage::user("hi")])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("401"));
    }
}
