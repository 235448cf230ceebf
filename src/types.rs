//! Core data model shared by skills, agents, router, and pipeline.
//!
//! Everything here is a plain value: chunks and passages live for one
//! retrieval, route results and responses for one request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum query length accepted by the pipeline
pub const MAX_QUERY_CHARS: usize = 2000;

/// Bounds for user-selected text passed alongside a query
pub const SELECTED_TEXT_MIN_CHARS: usize = 10;
pub const SELECTED_TEXT_MAX_CHARS: usize = 2000;

/// Session id used when the client supplies none; never persisted
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// Closed set of domains for agents and chunk tagging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentDomain {
    Glossary,
    Hardware,
    ModuleInfo,
    Capstone,
    /// Untagged content; only reachable through the fallback agent
    General,
}

impl AgentDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentDomain::Glossary => "glossary",
            AgentDomain::Hardware => "hardware",
            AgentDomain::ModuleInfo => "module_info",
            AgentDomain::Capstone => "capstone",
            AgentDomain::General => "general",
        }
    }

    /// Parse a domain tag; unknown tags map to `General`
    pub fn parse(tag: &str) -> AgentDomain {
        match tag {
            "glossary" => AgentDomain::Glossary,
            "hardware" => AgentDomain::Hardware,
            "module_info" => AgentDomain::ModuleInfo,
            "capstone" => AgentDomain::Capstone,
            _ => AgentDomain::General,
        }
    }

    /// Human-readable heading used in multi-agent synthesis
    pub fn heading(&self) -> &'static str {
        match self {
            AgentDomain::Glossary => "Glossary",
            AgentDomain::Hardware => "Hardware",
            AgentDomain::ModuleInfo => "Module Info",
            AgentDomain::Capstone => "Capstone",
            AgentDomain::General => "Book",
        }
    }
}

impl std::fmt::Display for AgentDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A segment of book content stored in the vector collection.
///
/// Produced by external ingestion; read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    /// File path of the source document
    pub source: String,
    pub title: String,
    pub section: Option<String>,
    #[serde(default = "default_domain")]
    pub domain: AgentDomain,
}

fn default_domain() -> AgentDomain {
    AgentDomain::General
}

/// A chunk returned from one retrieval call, with its similarity score
/// and 1-based ordinal rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub chunk: Chunk,
    /// Cosine similarity in [0, 1]
    pub score: f32,
    pub rank: usize,
}

/// Numbered reference to a chunk, rendered in answers as `[Source N]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based index, dense within one answer
    pub index: usize,
    pub source: String,
    pub title: String,
    pub section: Option<String>,
    pub relevance_score: f32,
}

impl Citation {
    /// Dedup key: citations with the same `(source, section)` collapse
    pub fn dedup_key(&self) -> (String, Option<String>) {
        (self.source.clone(), self.section.clone())
    }
}

/// Message role within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn in the per-session rolling history window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Set on assistant messages to attribute the answering agent
    pub agent_name: Option<String>,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            agent_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            agent_name: Some(agent_name.into()),
        }
    }
}

/// Context handed to an agent for one request; immutable to the agent
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub query: String,
    pub history: Vec<SessionMessage>,
    pub selected_text: Option<String>,
    pub domain_filter: Option<AgentDomain>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl AgentContext {
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            session_id: if session_id.is_empty() {
                ANONYMOUS_SESSION.to_string()
            } else {
                session_id
            },
            query: query.into(),
            history: Vec::new(),
            selected_text: None,
            domain_filter: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<SessionMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_selected_text(mut self, selected_text: Option<String>) -> Self {
        self.selected_text = selected_text;
        self
    }
}

/// The router's decision for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub primary_agent: String,
    pub secondary_agents: Vec<String>,
    /// Top score observed across agents, in [0, 1]
    pub confidence: f32,
    pub routing_reason: String,
    pub is_multi_domain: bool,
}

/// Structured response assembled when an agent run completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    pub citations: Vec<Citation>,
    pub agent_name: String,
    pub confidence: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Streaming event produced by a running agent or the synthesizer.
///
/// A stream is finite and non-restartable: one or more `Text`, zero or
/// more `Source` (always before the terminal event), then exactly one
/// `End` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text { content: String },
    Source { citation: Citation },
    End { agent: String },
    Error { message: String },
}

impl AgentEvent {
    /// Terminal events close the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::End { .. } | AgentEvent::Error { .. })
    }
}

/// Event paired with the agent that produced it, as emitted by the
/// pipeline. Validation errors carry no attribution.
#[derive(Debug, Clone)]
pub struct AttributedEvent {
    pub agent: Option<String>,
    pub event: AgentEvent,
}

/// Validate a raw query against the `AgentContext` constraints.
///
/// Rejects empty/whitespace-only queries, queries without a single
/// alphanumeric character, and queries over the length budget.
pub fn validate_query(query: &str) -> crate::errors::Result<()> {
    use crate::errors::ChatbotError;

    if query.trim().is_empty() {
        return Err(ChatbotError::QueryInvalid("query is empty".to_string()));
    }
    if !query.chars().any(|c| c.is_alphanumeric()) {
        return Err(ChatbotError::QueryInvalid(
            "query contains no alphanumeric characters".to_string(),
        ));
    }
    let len = query.chars().count();
    if len > MAX_QUERY_CHARS {
        return Err(ChatbotError::QueryTooLong { len, max: MAX_QUERY_CHARS });
    }
    Ok(())
}

/// Validate optional selected text against its length bounds
pub fn validate_selected_text(selected_text: Option<&str>) -> crate::errors::Result<()> {
    use crate::errors::ChatbotError;

    if let Some(text) = selected_text {
        let len = text.chars().count();
        if len < SELECTED_TEXT_MIN_CHARS || len > SELECTED_TEXT_MAX_CHARS {
            return Err(ChatbotError::SelectedTextInvalid {
                len,
                min: SELECTED_TEXT_MIN_CHARS,
                max: SELECTED_TEXT_MAX_CHARS,
            });
        }
    }
    Ok(())
}
