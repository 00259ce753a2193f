//! HTTP routes and shared state for the chat service.

use crate::context::tokens::TokenCounter;
use crate::provider::ChatProvider;
use crate::rate_limit::SessionRateLimiter;
use crate::resume::ResumeContext;
use crate::store::ConversationStore;
use crate::ws::ws_handler;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state for the chat server.
pub struct AppState {
    /// Application settings, constructed once at startup
    pub settings: vitae_common::config::Settings,
    /// System prompt and its token cost, computed at startup
    pub resume: ResumeContext,
    /// Shared BPE token counter
    pub tokens: TokenCounter,
    /// Conversation persistence
    pub store: Arc<ConversationStore>,
    /// Per-session admission control
    pub rate_limiter: SessionRateLimiter,
    /// LLM provider (swapped for a scripted one in tests)
    pub provider: Arc<dyn ChatProvider>,
}

/// Build the shared state from settings plus injectable collaborators.
pub fn create_state(
    settings: vitae_common::config::Settings,
    provider: Arc<dyn ChatProvider>,
    store: Arc<ConversationStore>,
) -> anyhow::Result<Arc<AppState>> {
    let tokens = TokenCounter::new()?;
    let resume = ResumeContext::from_file(Path::new(&settings.resume_path), &tokens)?;
    let rate_limiter = SessionRateLimiter::new(settings.limits.requests_per_minute);

    Ok(Arc::new(AppState {
        settings,
        resume,
        tokens,
        store,
        rate_limiter,
        provider,
    }))
}

/// Build the router: health check plus the chat WebSocket.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "vitae-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}
