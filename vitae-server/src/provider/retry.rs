//! Retry wrapper with bounded exponential backoff.
//!
//! Wraps a [`ChatProvider`] and re-attempts retryable failures (provider rate
//! limits, timeouts, connection errors) with `2^attempt`-second backoff.
//! Permanent failures (bad status, malformed payload) surface immediately.

use super::{ChatProvider, ChatRequest, LlmError};
use crate::message::PromptMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry behavior for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts per call (1 initial + up to `max_retries - 1` retries).
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Per-session LLM client.
///
/// One value is created when a WebSocket session starts and dropped when it
/// ends, so the resource is released on every exit path.
pub struct LlmClient {
    provider: Arc<dyn ChatProvider>,
    config: RetryConfig,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn ChatProvider>, config: RetryConfig) -> Self {
        Self { provider, config }
    }

    /// Backoff delay before retrying a zero-indexed failed attempt: 1s, 2s, 4s, ...
    fn backoff_delay(attempt: u32) -> Duration {
        Duration::from_secs(2_u64.saturating_pow(attempt))
    }

    /// Call the LLM with retry.
    ///
    /// The retry loop inspects the failure kind: rate limits and network
    /// failures back off and retry, everything else returns immediately.
    /// After the final attempt the last error is surfaced as-is, so an
    /// exhausted provider rate limit stays distinguishable from a dead
    /// network.
    pub async fn call(
        &self,
        messages: Vec<PromptMessage>,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            messages,
            temperature,
            max_tokens,
        };
        let provider_name = self.provider.name();

        for attempt in 0..self.config.max_retries {
            match self.provider.chat(request.clone()).await {
                Ok(content) => {
                    if attempt > 0 {
                        info!(
                            provider = provider_name,
                            attempt = attempt + 1,
                            "Provider recovered after retries"
                        );
                    }
                    return Ok(content);
                }
                Err(e) => {
                    let is_last = attempt + 1 >= self.config.max_retries;
                    if !e.is_retryable() || is_last {
                        return Err(e);
                    }

                    let delay = Self::backoff_delay(attempt);
                    warn!(
                        provider = provider_name,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(LlmError::Network("no attempts were made".into()))
    }
}
