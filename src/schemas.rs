//! Wire schemas for the chat and agent endpoints.

use serde::{Deserialize, Serialize};

use crate::types::{AttributedEvent, AgentEvent, Citation, RouteResult};

/// Request body for the chat endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub selected_text: Option<String>,
}

/// One streamed chunk: `data: <this as JSON>` per event
#[derive(Debug, Clone, Serialize)]
pub struct ChatStreamChunk {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: serde_json::Value,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<String>,
}

impl ChatStreamChunk {
    /// Map a pipeline event onto the wire shape
    pub fn from_event(attributed: AttributedEvent, session_id: &str) -> Self {
        let agent_used = attributed.agent;
        match attributed.event {
            AgentEvent::Text { content } => Self {
                kind: "text",
                content: serde_json::Value::String(content),
                session_id: session_id.to_string(),
                agent_used,
            },
            AgentEvent::Source { citation } => Self {
                kind: "source",
                content: serde_json::to_value(citation).unwrap_or_default(),
                session_id: session_id.to_string(),
                agent_used,
            },
            AgentEvent::End { agent } => Self {
                kind: "end",
                content: serde_json::Value::String(String::new()),
                session_id: session_id.to_string(),
                agent_used: Some(agent),
            },
            AgentEvent::Error { message } => Self {
                kind: "error",
                content: serde_json::Value::String(message),
                session_id: session_id.to_string(),
                agent_used,
            },
        }
    }
}

/// Response body for the non-streaming chat endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub query_id: String,
    pub session_id: String,
    pub latency_ms: u64,
    pub agent_used: String,
    pub routing_confidence: f32,
    pub is_multi_agent: bool,
}

/// Request body for the route preview endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub query: String,
}

/// Response body for the route preview endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    pub primary_agent: String,
    pub secondary_agents: Vec<String>,
    pub confidence: f32,
    pub reason: String,
    pub is_multi_domain: bool,
}

impl From<RouteResult> for RouteResponse {
    fn from(result: RouteResult) -> Self {
        Self {
            primary_agent: result.primary_agent,
            secondary_agents: result.secondary_agents,
            confidence: result.confidence,
            reason: result.routing_reason,
            is_multi_domain: result.is_multi_domain,
        }
    }
}

/// Summary of one registered agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub domain: String,
    pub description: String,
    pub keywords: Vec<String>,
}

/// Response listing all registered agents
#[derive(Debug, Clone, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentSummary>,
    pub total: usize,
}

/// Error body for non-streaming failures
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}
