//! RAG pipeline orchestrator: the single entry point binding validation,
//! routing, agent execution, synthesis, and session persistence.
//!
//! The pipeline is also the only place internal failures become stream
//! events; every emitted stream ends with exactly one `end` or `error`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{Agent, AgentRegistry, QueryRouter};
use crate::errors::{ChatbotError, Result};
use crate::skills::citation::CitationSkill;
use crate::skills::context::SessionContextSkill;
use crate::types::{
    validate_query, validate_selected_text, AgentContext, AgentEvent, AgentResponse,
    AttributedEvent, Citation, RouteResult, SessionMessage,
};

/// Event channel depth for one pipeline stream
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Per-query lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    New,
    Validated,
    Routed,
    Running,
    RunningPrimary,
    RunningSecondary,
    Synthesizing,
    Completed,
    Failed,
}

/// Events driving the query state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    Validate,
    Route,
    Start,
    StartPrimary,
    NextSecondary,
    Synthesize,
    Complete,
    Fail,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Completed | QueryState::Failed)
    }

    /// Attempt a state transition with validation
    pub fn advance(self, event: QueryEvent) -> Result<QueryState> {
        use QueryEvent::*;
        use QueryState::*;

        // Failure is reachable from every non-terminal state
        if event == Fail && !self.is_terminal() {
            return Ok(Failed);
        }

        let next = match (self, event) {
            (New, Validate) => Validated,
            (Validated, Route) => Routed,
            (Routed, Start) => Running,
            (Routed, StartPrimary) => RunningPrimary,
            (Running, Complete) => Completed,
            (RunningPrimary, NextSecondary) => RunningSecondary,
            (RunningPrimary, Synthesize) => Synthesizing,
            (RunningSecondary, NextSecondary) => RunningSecondary,
            (RunningSecondary, Synthesize) => Synthesizing,
            (Synthesizing, Complete) => Completed,
            (from, event) => {
                return Err(ChatbotError::InvalidTransition {
                    from: format!("{from:?}"),
                    event: format!("{event:?}"),
                });
            }
        };

        Ok(next)
    }
}

/// A running chat stream: the resolved session id plus its events
pub struct ChatStream {
    pub session_id: String,
    pub events: mpsc::Receiver<AttributedEvent>,
}

/// How one agent stream concluded from the pipeline's point of view
enum Terminal {
    /// Agent emitted `end`
    End,
    /// Agent emitted `error` with this user-visible message
    Error(String),
    /// Channel closed without a terminal event (agent task died)
    Vanished,
    /// Hard deadline elapsed
    TimedOut,
    /// Client went away; stop all work
    Cancelled,
}

struct StreamOutcome {
    text: String,
    citations: Vec<Citation>,
    terminal: Terminal,
}

enum Outcome {
    Completed { agent: String, text: String },
    Failed,
    Cancelled,
}

/// Orchestrator binding router, agents, skills, and sessions
#[derive(Clone)]
pub struct RagPipeline {
    registry: Arc<AgentRegistry>,
    router: Arc<QueryRouter>,
    sessions: SessionContextSkill,
    hard_timeout: Duration,
}

impl RagPipeline {
    pub fn new(
        registry: Arc<AgentRegistry>,
        router: Arc<QueryRouter>,
        sessions: SessionContextSkill,
        hard_timeout: Duration,
    ) -> Self {
        Self { registry, router, sessions, hard_timeout }
    }

    /// Preview the routing decision without executing any agent
    pub fn route_preview(&self, query: &str) -> Result<RouteResult> {
        validate_query(query)?;
        Ok(self.router.preview(query))
    }

    /// Stream an answer through the router
    pub fn chat_stream(
        &self,
        query: &str,
        session_id: Option<String>,
        selected_text: Option<String>,
    ) -> ChatStream {
        let session_id = resolve_session_id(session_id);
        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        if let Err(e) = validate_query(query)
            .and_then(|_| validate_selected_text(selected_text.as_deref()))
        {
            // Rejected before any agent is invoked
            let _ = tx.try_send(AttributedEvent {
                agent: None,
                event: AgentEvent::Error { message: e.user_message() },
            });
            return ChatStream { session_id, events };
        }

        let route = self.router.route(query);
        self.spawn_execution(tx, route, query, &session_id, selected_text);
        ChatStream { session_id, events }
    }

    /// Stream an answer from one named agent, bypassing the router
    pub fn agent_chat_stream(
        &self,
        agent_name: &str,
        query: &str,
        session_id: Option<String>,
        selected_text: Option<String>,
    ) -> Result<ChatStream> {
        let agent = self
            .registry
            .get(agent_name)
            .ok_or_else(|| ChatbotError::UnknownAgent(agent_name.to_string()))?;

        let session_id = resolve_session_id(session_id);
        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        if let Err(e) = validate_query(query)
            .and_then(|_| validate_selected_text(selected_text.as_deref()))
        {
            let _ = tx.try_send(AttributedEvent {
                agent: None,
                event: AgentEvent::Error { message: e.user_message() },
            });
            return Ok(ChatStream { session_id, events });
        }

        let route = RouteResult {
            primary_agent: agent.name().to_string(),
            secondary_agents: Vec::new(),
            confidence: 1.0,
            routing_reason: "direct agent invocation".to_string(),
            is_multi_domain: false,
        };
        self.spawn_execution(tx, route, query, &session_id, selected_text);
        Ok(ChatStream { session_id, events })
    }

    /// Run to completion and return the assembled response
    pub async fn chat(
        &self,
        query: &str,
        session_id: Option<String>,
        selected_text: Option<String>,
    ) -> Result<(AgentResponse, String)> {
        validate_query(query)?;
        validate_selected_text(selected_text.as_deref())?;

        let mut stream = self.chat_stream(query, session_id, selected_text);
        let mut response = String::new();
        let mut citations = Vec::new();

        while let Some(attributed) = stream.events.recv().await {
            match attributed.event {
                AgentEvent::Text { content } => response.push_str(&content),
                AgentEvent::Source { citation } => citations.push(citation),
                AgentEvent::End { agent } => {
                    return Ok((
                        AgentResponse {
                            response,
                            citations,
                            agent_name: agent,
                            confidence: 1.0,
                            metadata: serde_json::Map::new(),
                        },
                        stream.session_id,
                    ));
                }
                AgentEvent::Error { message } => {
                    return Err(ChatbotError::AgentFailure {
                        agent: attributed.agent.unwrap_or_default(),
                        message,
                    });
                }
            }
        }

        Err(ChatbotError::AgentFailure {
            agent: String::new(),
            message: "stream ended without a terminal event".to_string(),
        })
    }

    fn spawn_execution(
        &self,
        tx: mpsc::Sender<AttributedEvent>,
        route: RouteResult,
        query: &str,
        session_id: &str,
        selected_text: Option<String>,
    ) {
        let pipeline = self.clone();
        let query = query.to_string();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let mut state = QueryState::New;
            for event in [QueryEvent::Validate, QueryEvent::Route] {
                state = match state.advance(event) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(error = %e, "query state machine violation");
                        return;
                    }
                };
            }

            let history = pipeline.sessions.get_history(&session_id, None).await;
            pipeline.sessions.save_message(&session_id, SessionMessage::user(&query)).await;

            let context = AgentContext::new(session_id.clone(), query.clone())
                .with_history(history)
                .with_selected_text(selected_text);
            let deadline = Instant::now() + pipeline.hard_timeout;

            let outcome = if route.is_multi_domain {
                pipeline
                    .execute_multi(&tx, &route, &query, &context, deadline, &mut state)
                    .await
            } else {
                pipeline
                    .execute_single(&tx, &route, &query, &context, deadline, &mut state)
                    .await
            };

            match outcome {
                Outcome::Completed { agent, text } => {
                    let _ = state.advance(QueryEvent::Complete);
                    pipeline
                        .sessions
                        .save_message(&session_id, SessionMessage::assistant(text, &agent))
                        .await;
                    let _ = tx
                        .send(AttributedEvent {
                            agent: Some(agent.clone()),
                            event: AgentEvent::End { agent },
                        })
                        .await;
                }
                Outcome::Failed => {
                    let _ = state.advance(QueryEvent::Fail);
                }
                Outcome::Cancelled => {
                    info!(%session_id, "client disconnected, discarding partial answer");
                }
            }
        });
    }

    async fn execute_single(
        &self,
        tx: &mpsc::Sender<AttributedEvent>,
        route: &RouteResult,
        query: &str,
        context: &AgentContext,
        deadline: Instant,
        state: &mut QueryState,
    ) -> Outcome {
        *state = match state.advance(QueryEvent::Start) {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "query state machine violation");
                return Outcome::Failed;
            }
        };

        let Some(agent) = self.registry.get(&route.primary_agent) else {
            error!(agent = %route.primary_agent, "routed agent not registered");
            return self.emit_error(tx, None, generic_failure_message()).await;
        };

        let outcome =
            pump_stream(tx, agent.run_stream(query, context), deadline, agent.name(), true).await;

        match outcome.terminal {
            Terminal::End => {
                Outcome::Completed { agent: agent.name().to_string(), text: outcome.text }
            }
            Terminal::Error(message) => {
                self.emit_error(tx, Some(agent.name()), message).await
            }
            Terminal::TimedOut => {
                warn!(agent = agent.name(), "hard timeout, aborting stream");
                self.emit_error(tx, Some(agent.name()), timeout_message(self.hard_timeout)).await
            }
            Terminal::Cancelled => Outcome::Cancelled,
            Terminal::Vanished => self.retry_with_fallback(tx, agent.name(), query, context, deadline).await,
        }
    }

    /// One automatic re-run through the fallback agent after an
    /// unexpected agent death; a second failure surfaces as `error`.
    async fn retry_with_fallback(
        &self,
        tx: &mpsc::Sender<AttributedEvent>,
        failed_agent: &str,
        query: &str,
        context: &AgentContext,
        deadline: Instant,
    ) -> Outcome {
        warn!(agent = failed_agent, "agent stream died unexpectedly");

        let Some(fallback) = self.registry.default_agent() else {
            return self.emit_error(tx, None, generic_failure_message()).await;
        };
        if fallback.name() == failed_agent {
            return self.emit_error(tx, Some(failed_agent), generic_failure_message()).await;
        }

        info!(agent = fallback.name(), "re-running query through fallback agent");
        let outcome =
            pump_stream(tx, fallback.run_stream(query, context), deadline, fallback.name(), true)
                .await;

        match outcome.terminal {
            Terminal::End => {
                Outcome::Completed { agent: fallback.name().to_string(), text: outcome.text }
            }
            Terminal::Error(message) => self.emit_error(tx, Some(fallback.name()), message).await,
            Terminal::TimedOut => {
                self.emit_error(tx, Some(fallback.name()), timeout_message(self.hard_timeout)).await
            }
            Terminal::Cancelled => Outcome::Cancelled,
            Terminal::Vanished => {
                self.emit_error(tx, Some(fallback.name()), generic_failure_message()).await
            }
        }
    }

    /// Sequential multi-agent execution with synthesis.
    ///
    /// The primary runs first with the full query; each secondary runs
    /// with a scoped sub-query. A failing secondary is skipped; the
    /// answer degrades to what the others produced.
    async fn execute_multi(
        &self,
        tx: &mpsc::Sender<AttributedEvent>,
        route: &RouteResult,
        query: &str,
        context: &AgentContext,
        deadline: Instant,
        state: &mut QueryState,
    ) -> Outcome {
        *state = match state.advance(QueryEvent::StartPrimary) {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "query state machine violation");
                return Outcome::Failed;
            }
        };

        let mut agents: Vec<Arc<dyn Agent>> = Vec::new();
        for name in std::iter::once(&route.primary_agent).chain(&route.secondary_agents) {
            match self.registry.get(name) {
                Some(agent) => agents.push(agent),
                None => warn!(agent = %name, "secondary agent not registered, skipping"),
            }
        }
        if agents.is_empty() {
            return self.emit_error(tx, None, generic_failure_message()).await;
        }

        let domains: Vec<&str> = agents.iter().map(|a| a.domain().heading()).collect();
        let lead = format!(
            "This question spans multiple areas of the book: {}.",
            domains.join(", ")
        );
        let primary_name = agents[0].name().to_string();
        if send_text(tx, &primary_name, lead.clone()).await.is_err() {
            return Outcome::Cancelled;
        }

        let mut synthesized = lead;
        let mut citation_lists: Vec<Vec<Citation>> = Vec::new();

        for (i, agent) in agents.iter().enumerate() {
            let is_primary = i == 0;
            if !is_primary {
                *state = match state.advance(QueryEvent::NextSecondary) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(error = %e, "query state machine violation");
                        return Outcome::Failed;
                    }
                };
            }

            let sub_query = if is_primary {
                query.to_string()
            } else {
                self.router.derive_subquery(query, agent.as_ref())
            };

            let heading = format!("\n\n**{} Perspective:**\n", agent.domain().heading());
            if send_text(tx, agent.name(), heading.clone()).await.is_err() {
                return Outcome::Cancelled;
            }

            let outcome =
                pump_stream(tx, agent.run_stream(&sub_query, context), deadline, agent.name(), false)
                    .await;

            match outcome.terminal {
                Terminal::End => {
                    synthesized.push_str(&heading);
                    synthesized.push_str(&outcome.text);
                    citation_lists.push(outcome.citations);
                }
                Terminal::Error(message) if is_primary => {
                    return self.emit_error(tx, Some(agent.name()), message).await;
                }
                Terminal::Vanished if is_primary => {
                    return self
                        .retry_with_fallback(tx, agent.name(), query, context, deadline)
                        .await;
                }
                Terminal::Vanished | Terminal::Error(_) => {
                    // Degrade gracefully: skip this secondary
                    warn!(agent = agent.name(), "secondary agent failed, skipping");
                }
                Terminal::TimedOut => {
                    warn!(agent = agent.name(), "hard timeout during multi-agent execution");
                    return self
                        .emit_error(tx, Some(agent.name()), timeout_message(self.hard_timeout))
                        .await;
                }
                Terminal::Cancelled => return Outcome::Cancelled,
            }
        }

        *state = match state.advance(QueryEvent::Synthesize) {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "query state machine violation");
                return Outcome::Failed;
            }
        };

        let merged = CitationSkill::merge_citations(&citation_lists);
        for citation in merged {
            let sent = tx
                .send(AttributedEvent {
                    agent: Some(primary_name.clone()),
                    event: AgentEvent::Source { citation },
                })
                .await;
            if sent.is_err() {
                return Outcome::Cancelled;
            }
        }

        Outcome::Completed { agent: primary_name, text: synthesized }
    }

    async fn emit_error(
        &self,
        tx: &mpsc::Sender<AttributedEvent>,
        agent: Option<&str>,
        message: String,
    ) -> Outcome {
        let sent = tx
            .send(AttributedEvent {
                agent: agent.map(String::from),
                event: AgentEvent::Error { message },
            })
            .await;
        if sent.is_err() {
            Outcome::Cancelled
        } else {
            Outcome::Failed
        }
    }
}

/// Forward one agent stream, accumulating text and citations.
///
/// `forward_sources` controls whether `source` and `error` events pass
/// through directly (single-agent) or stay with the caller for
/// synthesis (multi-agent). The pipeline always withholds `end`; it
/// emits the single terminal event itself.
async fn pump_stream(
    tx: &mpsc::Sender<AttributedEvent>,
    mut rx: mpsc::Receiver<AgentEvent>,
    deadline: Instant,
    agent: &str,
    forward_sources: bool,
) -> StreamOutcome {
    let mut text = String::new();
    let mut citations = Vec::new();

    loop {
        let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => return StreamOutcome { text, citations, terminal: Terminal::TimedOut },
            Ok(None) => return StreamOutcome { text, citations, terminal: Terminal::Vanished },
            Ok(Some(event)) => event,
        };

        match event {
            AgentEvent::Text { content } => {
                text.push_str(&content);
                if send_text(tx, agent, content).await.is_err() {
                    return StreamOutcome { text, citations, terminal: Terminal::Cancelled };
                }
            }
            AgentEvent::Source { citation } => {
                if forward_sources {
                    let sent = tx
                        .send(AttributedEvent {
                            agent: Some(agent.to_string()),
                            event: AgentEvent::Source { citation: citation.clone() },
                        })
                        .await;
                    if sent.is_err() {
                        return StreamOutcome { text, citations, terminal: Terminal::Cancelled };
                    }
                }
                citations.push(citation);
            }
            AgentEvent::End { .. } => {
                return StreamOutcome { text, citations, terminal: Terminal::End };
            }
            AgentEvent::Error { message } => {
                return StreamOutcome { text, citations, terminal: Terminal::Error(message) };
            }
        }
    }
}

async fn send_text(
    tx: &mpsc::Sender<AttributedEvent>,
    agent: &str,
    content: String,
) -> std::result::Result<(), mpsc::error::SendError<AttributedEvent>> {
    tx.send(AttributedEvent {
        agent: Some(agent.to_string()),
        event: AgentEvent::Text { content },
    })
    .await
}

fn resolve_session_id(session_id: Option<String>) -> String {
    match session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    }
}

fn generic_failure_message() -> String {
    "Something went wrong while answering your question. Please try again.".to_string()
}

fn timeout_message(hard_timeout: Duration) -> String {
    ChatbotError::AgentTimeout { agent: String::new(), seconds: hard_timeout.as_secs() }
        .user_message()
}
