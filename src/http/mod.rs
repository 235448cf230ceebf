//! Inbound HTTP surface.
//!
//! Thin handlers over the pipeline: the streaming chat endpoint, route
//! preview, and agent introspection. All routes live under
//! `/api/chatbot`.

pub mod agents;
pub mod chat;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::pipeline::RagPipeline;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub registry: Arc<AgentRegistry>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chatbot/chat", post(chat::chat))
        .route("/api/chatbot/chat/stream", post(chat::chat_stream))
        .route("/api/chatbot/chat/route", post(chat::route_preview))
        .route("/api/chatbot/agents", get(agents::list_agents))
        .route("/api/chatbot/agents/:name", get(agents::get_agent))
        .route("/api/chatbot/agents/:name/chat", post(agents::agent_chat))
        .route("/api/chatbot/health", get(chat::health))
        .with_state(state)
}
