//! Agent introspection endpoints and direct agent chat.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::Stream;
use std::convert::Infallible;

use crate::agents::Agent;
use crate::http::chat::{error_response, sse_response};
use crate::http::AppState;
use crate::schemas::{AgentListResponse, AgentSummary, ChatRequest, ErrorResponse};

fn summarize(agent: &dyn Agent) -> AgentSummary {
    AgentSummary {
        name: agent.name().to_string(),
        domain: agent.domain().as_str().to_string(),
        description: agent.description().to_string(),
        keywords: agent.keywords().iter().map(|kw| kw.to_string()).collect(),
    }
}

/// GET /api/chatbot/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    let agents: Vec<AgentSummary> =
        state.registry.all().iter().map(|agent| summarize(agent.as_ref())).collect();
    let total = agents.len();
    Json(AgentListResponse { agents, total })
}

/// GET /api/chatbot/agents/{name}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AgentSummary>, (StatusCode, Json<ErrorResponse>)> {
    state
        .registry
        .get(&name)
        .map(|agent| Json(summarize(agent.as_ref())))
        .ok_or_else(|| {
            error_response(crate::errors::ChatbotError::UnknownAgent(name))
        })
}

/// POST /api/chatbot/agents/{name}/chat
///
/// Same body and stream as the routed chat endpoint, but invokes the
/// named agent directly.
pub async fn agent_chat(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ErrorResponse>)>
{
    let stream = state
        .pipeline
        .agent_chat_stream(&name, &request.query, request.session_id, request.selected_text)
        .map_err(error_response)?;
    Ok(sse_response(stream))
}
