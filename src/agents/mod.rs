//! Domain agents and the shared execution core.
//!
//! Agents implement a uniform contract: a pure `can_handle` score, a
//! non-streaming `run`, and an incremental `run_stream`. The retrieval,
//! citation, and LLM plumbing is identical across domains and lives in
//! [`AgentCore`]; each agent contributes its identity, keyword
//! vocabulary, scoring signals, and system prompt.

pub mod book;
pub mod capstone;
pub mod glossary;
pub mod hardware;
pub mod module_info;
pub mod registry;
pub mod router;

pub use book::BookAgent;
pub use capstone::CapstoneAgent;
pub use glossary::GlossaryAgent;
pub use hardware::HardwareAgent;
pub use module_info::ModuleInfoAgent;
pub use registry::AgentRegistry;
pub use router::QueryRouter;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{ChatbotError, Result};
use crate::llm::{ChatModel, CompletionRequest};
use crate::skills::citation::{CitationSkill, MarkerScrubber};
use crate::skills::retrieval::RetrievalSkill;
use crate::types::{AgentContext, AgentDomain, AgentEvent, AgentResponse};

/// Event channel depth for one agent stream
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// History turns included in the prompt (the session window may be larger)
const PROMPT_HISTORY_TURNS: usize = 5;

/// A domain-specialized question answerer
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique lowercase snake_case identifier
    fn name(&self) -> &'static str;

    fn domain(&self) -> AgentDomain;

    fn description(&self) -> &'static str;

    /// Keyword vocabulary; every agent declares at least three
    fn keywords(&self) -> &'static [&'static str];

    fn system_prompt(&self) -> &'static str;

    /// Confidence in [0, 1] for handling this query.
    ///
    /// Deterministic and pure: no I/O, microsecond cost.
    fn can_handle(&self, query: &str) -> f32;

    /// Stream the answer as a finite sequence of events terminated by
    /// exactly one `End` or `Error`.
    fn run_stream(&self, query: &str, context: &AgentContext) -> mpsc::Receiver<AgentEvent>;

    /// Run to completion and return the assembled response
    async fn run(&self, query: &str, context: &AgentContext) -> Result<AgentResponse> {
        collect_response(self.run_stream(query, context), self.name()).await
    }
}

/// Count keywords appearing case-insensitively in the query
pub(crate) fn keyword_matches(keywords: &[&str], query_lower: &str) -> usize {
    keywords.iter().filter(|kw| query_lower.contains(&kw.to_lowercase())).count()
}

/// Base score from keyword matches alone, capped so pattern signals
/// keep room to differentiate
pub(crate) fn base_score(matches: usize) -> f32 {
    (matches as f32 / 3.0).min(0.6)
}

/// True when any phrase occurs in the (lowercased) query
pub(crate) fn any_phrase(phrases: &[&str], query_lower: &str) -> bool {
    phrases.iter().any(|p| query_lower.contains(p))
}

/// Per-agent LLM generation settings
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Shared retrieval → prompt → stream → citations flow.
///
/// Cheap to clone; the spawned task owns a clone for the stream's
/// lifetime.
#[derive(Clone)]
pub struct AgentCore {
    retrieval: Arc<RetrievalSkill>,
    llm: Arc<dyn ChatModel>,
    soft_timeout: Duration,
}

impl AgentCore {
    pub fn new(retrieval: Arc<RetrievalSkill>, llm: Arc<dyn ChatModel>) -> Self {
        Self { retrieval, llm, soft_timeout: Duration::from_secs(20) }
    }

    pub fn with_soft_timeout(mut self, soft_timeout: Duration) -> Self {
        self.soft_timeout = soft_timeout;
        self
    }

    /// Retrieve with the agent's domain filter, falling back to an
    /// unfiltered search when the filtered one comes back empty.
    async fn gather_passages(
        &self,
        query: &str,
        domain_filter: Option<AgentDomain>,
    ) -> Result<Vec<crate::types::RetrievedPassage>> {
        let passages = self.retrieval.retrieve(query, domain_filter, None, None).await?;
        if passages.is_empty() && domain_filter.is_some() {
            return self.retrieval.retrieve(query, None, None, None).await;
        }
        Ok(passages)
    }

    /// Drive one streamed answer for an agent.
    ///
    /// Event order: `Text`* then `Source`* then one `End`; any failure
    /// yields a single `Error` instead and stops.
    pub fn stream_answer(
        &self,
        agent_name: &'static str,
        domain_filter: Option<AgentDomain>,
        system_prompt: &'static str,
        instructions: &'static str,
        params: GenerationParams,
        query: &str,
        context: &AgentContext,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let core = self.clone();
        let query = query.to_string();
        let context = context.clone();

        tokio::spawn(async move {
            let soft_deadline = Instant::now() + core.soft_timeout;

            let passages = match core.gather_passages(&query, domain_filter).await {
                Ok(passages) => passages,
                Err(e) => {
                    warn!(agent = agent_name, error = %e, "retrieval failed");
                    let _ = tx.send(AgentEvent::Error { message: e.user_message() }).await;
                    return;
                }
            };

            let deduped = CitationSkill::dedupe_passages(&passages);
            let citations = CitationSkill::format_citations(&deduped);
            let context_block =
                CitationSkill::build_prompt_context(&deduped, context.selected_text.as_deref());

            let history_start = context.history.len().saturating_sub(PROMPT_HISTORY_TURNS);
            let request = CompletionRequest {
                system: system_prompt.to_string(),
                history: context.history[history_start..].to_vec(),
                user: format!(
                    "Context from the book:\n{context_block}\n\nUser Question: {query}\n\n{instructions}"
                ),
                temperature: params.temperature,
                max_tokens: params.max_tokens,
            };

            let mut tokens = match core.llm.stream_chat(request).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(agent = agent_name, error = %e, "completion request failed");
                    let _ = tx.send(AgentEvent::Error { message: e.user_message() }).await;
                    return;
                }
            };

            let mut scrubber = MarkerScrubber::new(citations.len());
            while let Some(item) = tokens.recv().await {
                match item {
                    Ok(token) => {
                        let ready = scrubber.push(&token);
                        if !ready.is_empty()
                            && tx.send(AgentEvent::Text { content: ready }).await.is_err()
                        {
                            return;
                        }
                        if Instant::now() >= soft_deadline {
                            debug!(agent = agent_name, "soft timeout, finishing early");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(agent = agent_name, error = %e, "completion stream failed");
                        let _ = tx.send(AgentEvent::Error { message: e.user_message() }).await;
                        return;
                    }
                }
            }
            drop(tokens);

            let tail = scrubber.finish();
            if !tail.is_empty()
                && tx.send(AgentEvent::Text { content: tail }).await.is_err()
            {
                return;
            }

            for citation in citations {
                if tx.send(AgentEvent::Source { citation }).await.is_err() {
                    return;
                }
            }

            let _ = tx.send(AgentEvent::End { agent: agent_name.to_string() }).await;
        });

        rx
    }
}

/// Collect a stream into an `AgentResponse` (non-streaming path)
pub async fn collect_response(
    mut rx: mpsc::Receiver<AgentEvent>,
    agent_name: &str,
) -> Result<AgentResponse> {
    let mut response = String::new();
    let mut citations = Vec::new();

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Text { content } => response.push_str(&content),
            AgentEvent::Source { citation } => citations.push(citation),
            AgentEvent::End { agent } => {
                return Ok(AgentResponse {
                    response,
                    citations,
                    agent_name: agent,
                    confidence: 1.0,
                    metadata: serde_json::Map::new(),
                });
            }
            AgentEvent::Error { message } => {
                return Err(ChatbotError::AgentFailure {
                    agent: agent_name.to_string(),
                    message,
                });
            }
        }
    }

    Err(ChatbotError::AgentFailure {
        agent: agent_name.to_string(),
        message: "stream ended without a terminal event".to_string(),
    })
}
