//! LLM provider abstraction.
//!
//! A provider performs exactly one completion attempt and reports failures as
//! kind-tagged values; the retry loop in [`LlmClient`] inspects those tags
//! instead of dispatching on exception types.

mod openrouter;
mod retry;

pub use openrouter::OpenRouterProvider;
pub use retry::{LlmClient, RetryConfig};

use crate::message::PromptMessage;
use async_trait::async_trait;
use thiserror::Error;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Ordered message list: system + pruned history + new question
    pub messages: Vec<PromptMessage>,
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum tokens the model may generate
    pub max_tokens: usize,
}

/// One-attempt completion interface.
///
/// Implementations must not retry internally; classification of the failure
/// is their whole contract beyond the happy path.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Perform one completion attempt.
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError>;
}

/// Failure taxonomy for provider calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP 429 from the provider (retryable, distinct from the session limiter)
    #[error("provider rate limit: {0}")]
    RateLimited(String),

    /// Non-success HTTP status other than 429 (permanent)
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// Request timed out (retryable)
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (retryable)
    #[error("network error: {0}")]
    Network(String),

    /// 2xx response whose payload has no usable content (permanent -
    /// retrying will not fix a malformed payload)
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether the retry loop may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout | Self::Network(_)
        )
    }
}
