//! OpenRouter provider implementation.
//!
//! Speaks the OpenAI-compatible `/chat/completions` wire format against a
//! configurable base URL (tests point it at a local mock server).

use super::{ChatProvider, ChatRequest, LlmError};
use crate::message::PromptMessage;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vitae_common::config::LlmConfig;

/// OpenRouter completion API provider.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenRouterProvider {
    /// Create a provider from LLM settings.
    ///
    /// Fails if the API key is missing or the HTTP client cannot be built.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("OPENROUTER_API_KEY not configured");
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| anyhow::anyhow!("API key contains invalid header characters"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let payload = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        extract_content(data)
    }
}

/// Pull the answer text out of a completion response.
fn extract_content(data: CompletionResponse) -> Result<String, LlmError> {
    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;

    let content = choice.message.content.unwrap_or_default();
    if content.is_empty() {
        return Err(LlmError::InvalidResponse("empty content in response".into()));
    }

    Ok(content)
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f64,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            api_key: "test-key".into(),
            base_url: base_url.into(),
            model: "test/model".into(),
            timeout_secs: 5,
            max_retries: 3,
            temperature: 0.7,
        }
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            messages: vec![
                PromptMessage::system("You answer questions about a resume."),
                PromptMessage::user("What is your name?"),
            ],
            temperature: 0.7,
            max_tokens: 100,
        }
    }

    fn success_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "test/model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Hello!")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&test_config(&server.uri())).unwrap();
        let content = provider.chat(test_request()).await.unwrap();
        assert_eq!(content, "Hello!");
    }

    #[tokio::test]
    async fn test_429_classified_as_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&test_config(&server.uri())).unwrap();
        let err = provider.chat(test_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_500_classified_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&test_config(&server.uri())).unwrap();
        let err = provider.chat(test_request()).await.unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&test_config(&server.uri())).unwrap();
        let err = provider.chat(test_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("")))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::from_config(&test_config(&server.uri())).unwrap();
        let err = provider.chat(test_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        // Nothing is listening on this port.
        let mut config = test_config("http://127.0.0.1:1");
        config.timeout_secs = 2;

        let provider = OpenRouterProvider::from_config(&config).unwrap();
        let err = provider.chat(test_request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_rate_limit_retries_exhaust_through_http() {
        use crate::provider::{LlmClient, RetryConfig};
        use std::sync::Arc;

        let server = MockServer::start().await;
        // Exactly 3 attempts reach the wire: 1 initial + 2 retries.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let provider =
            Arc::new(OpenRouterProvider::from_config(&test_config(&server.uri())).unwrap());
        let client = LlmClient::new(provider, RetryConfig { max_retries: 3 });

        let err = client
            .call(vec![PromptMessage::user("hi")], 0.7, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited(_)));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut config = test_config("http://localhost");
        config.api_key = String::new();
        assert!(OpenRouterProvider::from_config(&config).is_err());
    }
}
