//! Vitae Server - a WebSocket chatbot backend for resume Q&A.
//!
//! One WebSocket connection carries one session. Each inbound question is
//! sanitized and screened, admission-controlled, answered by the configured
//! LLM provider against a token-budgeted slice of the conversation history,
//! and persisted alongside the answer.
//!
//! ```text
//! Client ──ws──▶ orchestrator ──▶ sanitize/screen ──▶ rate limit
//!                     │                                    │
//!                     ▼                                    ▼
//!                 response ◀── persist ◀── LLM call ◀── prune history
//! ```

#![warn(clippy::all)]

pub mod context;
pub mod message;
pub mod prompts;
pub mod protocol;
pub mod provider;
pub mod rate_limit;
pub mod resume;
pub mod routes;
pub mod store;
pub mod ws;

pub use routes::{build_router, create_state, AppState};

use provider::OpenRouterProvider;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use store::ConversationStore;
use vitae_common::config::Settings;

/// Start the chat server and run until the listener fails.
pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = settings.bind_address().parse()?;

    let provider = Arc::new(OpenRouterProvider::from_config(&settings.llm)?);
    let store = Arc::new(ConversationStore::open(Path::new(&settings.storage.db_path))?);
    let state = create_state(settings, provider, store)?;
    let router = build_router(state);

    tracing::info!("Starting Vitae Server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
