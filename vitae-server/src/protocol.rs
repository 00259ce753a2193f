//! Wire protocol for the chat WebSocket.
//!
//! Each frame is a JSON object with a `type` discriminator. The client sends
//! questions; the server answers with `system`, `response`, or `error` frames.

use serde::{Deserialize, Serialize};

/// Greeting sent once, immediately after the connection is accepted.
pub const WELCOME_MESSAGE: &str = "Connected! Ready to answer questions about the resume.";

/// Client → server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A question about the resume (1..=2000 characters).
    Question { question: String },
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection lifecycle notice.
    System { message: String },
    /// Successful answer to a question.
    Response { response: String },
    /// Per-turn failure; the connection stays open.
    Error { error: String, code: ErrorCode },
}

impl ServerFrame {
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn response(response: impl Into<String>) -> Self {
        Self::Response {
            response: response.into(),
        }
    }

    pub fn error(code: ErrorCode, error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            code,
        }
    }
}

/// Machine-readable failure classification surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed frame, disallowed content, empty or oversize question
    ValidationError,
    /// Session-level sliding-window limit hit
    RateLimitExceeded,
    /// Provider-level rate limit, retries exhausted
    RateLimit,
    /// Provider returned a bad status or malformed payload
    ApiError,
    /// Provider unreachable (timeout / connection failure) after retries
    LlmError,
    /// Conversation store failure
    DatabaseError,
    /// Anything unexpected; details stay server-side
    InternalError,
}
