//! WebSocket session orchestrator.
//!
//! Binds one WebSocket connection to one session and runs the per-turn
//! pipeline: validate -> sanitize + screen -> rate limit -> load and prune
//! history -> build prompt -> call LLM -> persist the exchange -> respond.
//! Per-turn failures are mapped to typed error frames and the connection
//! stays open; only transport-level failures end the session.

use crate::context::prune_history;
use crate::message::PromptMessage;
use crate::protocol::{ClientFrame, ErrorCode, ServerFrame, WELCOME_MESSAGE};
use crate::provider::{LlmClient, LlmError, RetryConfig};
use crate::routes::AppState;
use crate::store::StoreError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vitae_common::sanitize::{check_suspicious_content, sanitize_input, MAX_QUESTION_LENGTH};

/// Connection parameters.
///
/// Supplying `session_id` reattaches the connection to prior conversation
/// history; otherwise a fresh identifier is generated.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session_id: Option<String>,
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

/// Lazy binding of a session to its persisted conversation.
///
/// A session starts unbound; it transitions exactly once to `Bound` - on
/// first read of an existing conversation or on the first persisted turn.
enum Binding {
    Unbound,
    Bound(i64),
}

/// Everything a per-turn failure needs to become a client-visible error.
#[derive(Debug, Error)]
enum TurnError {
    #[error("{0}")]
    Validation(String),

    #[error("session rate limit exceeded")]
    SessionRateLimit,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TurnError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::SessionRateLimit => ErrorCode::RateLimitExceeded,
            Self::Llm(LlmError::RateLimited(_)) => ErrorCode::RateLimit,
            Self::Llm(LlmError::Api { .. } | LlmError::InvalidResponse(_)) => ErrorCode::ApiError,
            Self::Llm(LlmError::Timeout | LlmError::Network(_)) => ErrorCode::LlmError,
            Self::Store(StoreError::Poisoned) => ErrorCode::InternalError,
            Self::Store(_) => ErrorCode::DatabaseError,
        }
    }

    /// Human-readable message for the client. Never carries provider bodies,
    /// SQL details, or matched patterns.
    fn client_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::SessionRateLimit => {
                "Too many requests. Please wait a moment before asking again.".into()
            }
            Self::Llm(LlmError::RateLimited(_)) => {
                "The assistant is receiving too many requests right now. Please try again in a moment."
                    .into()
            }
            Self::Llm(LlmError::Api { .. } | LlmError::InvalidResponse(_)) => {
                "The language model service returned an error. Please try again.".into()
            }
            Self::Llm(LlmError::Timeout | LlmError::Network(_)) => {
                "The language model service is currently unavailable. Please try again.".into()
            }
            Self::Store(StoreError::Poisoned) => {
                "An internal error occurred. Please try again.".into()
            }
            Self::Store(_) => "Failed to save the conversation. Please try again.".into(),
        }
    }

    /// Full detail stays server-side; severity depends on the kind.
    fn log(&self, session_id: &str) {
        match self {
            Self::Validation(msg) => {
                info!(session_id = %session_id, reason = %msg, "Rejected question")
            }
            Self::SessionRateLimit => {
                debug!(session_id = %session_id, "Turn rejected by session rate limit")
            }
            Self::Llm(e) => error!(session_id = %session_id, error = %e, "LLM call failed"),
            Self::Store(e) => {
                error!(session_id = %session_id, error = %e, "Conversation store failure")
            }
        }
    }
}

/// One WebSocket connection bound to one session.
pub struct ChatSession {
    session_id: String,
    binding: Binding,
    llm: LlmClient,
    state: Arc<AppState>,
}

impl ChatSession {
    fn new(session_id: String, state: Arc<AppState>) -> Self {
        // The LLM client lives exactly as long as the session; dropping the
        // session releases it on every exit path.
        let llm = LlmClient::new(
            Arc::clone(&state.provider),
            RetryConfig {
                max_retries: state.settings.llm.max_retries,
            },
        );
        Self {
            session_id,
            binding: Binding::Unbound,
            llm,
            state,
        }
    }

    /// Run one question -> answer turn. Any error leaves conversation state
    /// untouched.
    async fn process_turn(&mut self, raw: &str) -> Result<String, TurnError> {
        // Frame shape
        let frame: ClientFrame = serde_json::from_str(raw).map_err(|e| {
            debug!(session_id = %self.session_id, error = %e, "Malformed frame");
            TurnError::validation(
                r#"Invalid message format. Expected {"type": "question", "question": "..."}."#,
            )
        })?;
        let ClientFrame::Question { question } = frame;

        if question.chars().count() > MAX_QUESTION_LENGTH {
            return Err(TurnError::validation(format!(
                "Question is too long (maximum {MAX_QUESTION_LENGTH} characters)."
            )));
        }

        // Sanitize, then screen the sanitized text
        let question = sanitize_input(&question);
        if question.is_empty() {
            return Err(TurnError::validation("Question cannot be empty."));
        }
        if let Some(category) = check_suspicious_content(&question) {
            warn!(
                session_id = %self.session_id,
                category = category,
                "Blocked suspicious question"
            );
            return Err(TurnError::validation(
                "Question contains content that cannot be processed.",
            ));
        }

        // Admission control
        if !self.state.rate_limiter.allow(&self.session_id).await {
            return Err(TurnError::SessionRateLimit);
        }

        // History, pruned to the token budget
        let history = self.load_history()?;
        let ctx = &self.state.settings.context;
        let (history, removed_tokens) = prune_history(
            &history,
            &self.state.tokens,
            self.state.resume.system_prompt_tokens,
            ctx.max_context_tokens,
            ctx.min_exchanges,
            ctx.max_response_tokens,
        );
        if removed_tokens > 0 {
            debug!(
                session_id = %self.session_id,
                removed_tokens,
                "Pruned history before prompting"
            );
        }

        let messages = crate::prompts::build_prompt(
            &self.state.resume.system_prompt,
            &history,
            &question,
        );

        let answer = self
            .llm
            .call(
                messages,
                self.state.settings.llm.temperature,
                ctx.max_response_tokens,
            )
            .await?;

        // The turn is committed only after the LLM call succeeded.
        self.persist_turn(&question, &answer)?;

        info!(
            session_id = %self.session_id,
            answer_chars = answer.len(),
            "Turn completed"
        );
        Ok(answer)
    }

    /// Load conversation history, binding lazily. Reading never creates a
    /// conversation; an unknown session simply has no history yet.
    fn load_history(&mut self) -> Result<Vec<PromptMessage>, StoreError> {
        let conversation_id = match self.binding {
            Binding::Bound(id) => id,
            Binding::Unbound => match self.state.store.find_by_session(&self.session_id)? {
                Some(record) => {
                    self.binding = Binding::Bound(record.id);
                    record.id
                }
                None => return Ok(Vec::new()),
            },
        };

        let messages = self.state.store.list_messages(conversation_id)?;
        Ok(messages
            .into_iter()
            .map(|m| PromptMessage::new(m.role, m.content))
            .collect())
    }

    /// Persist the user question and assistant answer as one transaction,
    /// creating the conversation on first write.
    fn persist_turn(&mut self, question: &str, answer: &str) -> Result<(), StoreError> {
        let conversation_id = match self.binding {
            Binding::Bound(id) => id,
            Binding::Unbound => {
                let record = self.state.store.create_or_get(&self.session_id)?;
                self.binding = Binding::Bound(record.id);
                record.id
            }
        };

        let question_tokens = self.state.tokens.count_tokens(question);
        let answer_tokens = self.state.tokens.count_tokens(answer);
        self.state.store.append_exchange(
            conversation_id,
            question,
            answer,
            question_tokens,
            answer_tokens,
        )
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(text)).await
}

/// Drive one connection from accept to close.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: Option<String>) {
    let session_id = session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(session_id = %session_id, "Client connected");

    let mut session = ChatSession::new(session_id, Arc::clone(&state));
    let (mut sender, mut receiver) = socket.split();

    if send_frame(&mut sender, &ServerFrame::system(WELCOME_MESSAGE))
        .await
        .is_err()
    {
        close_session(&state, &session.session_id).await;
        return;
    }

    // One turn runs to completion before the next inbound message is read;
    // there is no pipelining within a session.
    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(session_id = %session.session_id, error = %e, "Transport error");
                break;
            }
        };

        let reply = match message {
            Message::Text(text) => match session.process_turn(&text).await {
                Ok(answer) => ServerFrame::response(answer),
                Err(e) => {
                    e.log(&session.session_id);
                    ServerFrame::error(e.code(), e.client_message())
                }
            },
            Message::Binary(_) => ServerFrame::error(
                ErrorCode::ValidationError,
                "Expected a JSON text frame.",
            ),
            Message::Close(_) => break,
            // Protocol-level keepalive; nothing to do.
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if send_frame(&mut sender, &reply).await.is_err() {
            break;
        }
    }

    close_session(&state, &session.session_id).await;
}

/// Release per-session resources on every exit path.
async fn close_session(state: &AppState, session_id: &str) {
    state.rate_limiter.reset(session_id).await;
    info!(session_id = %session_id, "Client disconnected");
}
