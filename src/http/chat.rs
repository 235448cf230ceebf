//! Chat endpoints: streaming answer, non-streaming answer, route
//! preview, and service health.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tracing::error;
use uuid::Uuid;

use crate::errors::ChatbotError;
use crate::http::AppState;
use crate::pipeline::ChatStream;
use crate::schemas::{
    ChatRequest, ChatResponse, ChatStreamChunk, ErrorResponse, RouteRequest, RouteResponse,
};

/// POST /api/chatbot/chat/stream
///
/// Event-stream response: one `data:` line per event, one or more
/// `text`, zero or more `source`, exactly one `end` or `error`.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream =
        state.pipeline.chat_stream(&request.query, request.session_id, request.selected_text);
    sse_response(stream)
}

/// POST /api/chatbot/chat
///
/// Full answer with citations after processing completes.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let started = Instant::now();

    let route = state.pipeline.route_preview(&request.query).map_err(error_response)?;
    let (response, session_id) = state
        .pipeline
        .chat(&request.query, request.session_id, request.selected_text)
        .await
        .map_err(error_response)?;

    Ok(Json(ChatResponse {
        answer: response.response,
        citations: response.citations,
        query_id: Uuid::new_v4().to_string(),
        session_id,
        latency_ms: started.elapsed().as_millis() as u64,
        agent_used: response.agent_name,
        routing_confidence: route.confidence,
        is_multi_agent: route.is_multi_domain,
    }))
}

/// POST /api/chatbot/chat/route
///
/// Inspect the routing decision without executing an agent.
pub async fn route_preview(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, (StatusCode, Json<ErrorResponse>)> {
    let route = state.pipeline.route_preview(&request.query).map_err(error_response)?;
    Ok(Json(RouteResponse::from(route)))
}

/// GET /api/chatbot/health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "agents": state.registry.len(),
    }))
}

/// Adapt a pipeline stream into the SSE response shape
pub(crate) fn sse_response(
    stream: ChatStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = stream.session_id;
    let mut events = stream.events;

    let sse_stream = async_stream::stream! {
        while let Some(attributed) = events.recv().await {
            let terminal = attributed.event.is_terminal();
            let chunk = ChatStreamChunk::from_event(attributed, &session_id);
            match serde_json::to_string(&chunk) {
                Ok(json) => yield Ok(Event::default().data(json)),
                Err(e) => {
                    error!(error = %e, "failed to serialize stream chunk");
                    break;
                }
            }
            if terminal {
                break;
            }
        }
    };

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}

/// Map pipeline errors onto HTTP statuses for non-streaming endpoints
pub(crate) fn error_response(e: ChatbotError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &e {
        ChatbotError::QueryInvalid(_) => (StatusCode::BAD_REQUEST, "INVALID_QUERY"),
        ChatbotError::QueryTooLong { .. } => (StatusCode::BAD_REQUEST, "QUERY_TOO_LONG"),
        ChatbotError::SelectedTextInvalid { .. } => (StatusCode::BAD_REQUEST, "INVALID_QUERY"),
        ChatbotError::UnknownAgent(_) => (StatusCode::NOT_FOUND, "UNKNOWN_AGENT"),
        ChatbotError::RetrievalUnavailable(_) | ChatbotError::LlmUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };
    (status, Json(ErrorResponse { error: code, message: e.user_message() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_400() {
        let (status, body) = error_response(ChatbotError::QueryInvalid("empty".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "INVALID_QUERY");

        let (status, _) =
            error_response(ChatbotError::QueryTooLong { len: 3000, max: 2000 });
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unknown_agent_maps_to_404() {
        let (status, _) = error_response(ChatbotError::UnknownAgent("nope".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_collaborator_failures_map_to_503() {
        let (status, body) =
            error_response(ChatbotError::RetrievalUnavailable("down".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.message.contains("down"));
    }
}
