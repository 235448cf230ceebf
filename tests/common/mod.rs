//! Shared mock collaborators for integration tests.
//!
//! The embedding service, vector store, and LLM provider are replaced
//! with deterministic in-process fakes; everything else is the real
//! pipeline.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use bookbuddy::agents::{
    AgentCore, AgentRegistry, BookAgent, CapstoneAgent, GlossaryAgent, HardwareAgent,
    ModuleInfoAgent, QueryRouter,
};
use bookbuddy::config::RetrievalConfig;
use bookbuddy::embedding::EmbeddingProvider;
use bookbuddy::errors::{ChatbotError, Result};
use bookbuddy::llm::{ChatModel, CompletionRequest};
use bookbuddy::pipeline::RagPipeline;
use bookbuddy::skills::{MemorySessionStore, RetrievalSkill, SessionContextSkill};
use bookbuddy::types::{AgentDomain, Chunk};
use bookbuddy::vector::{ScoredChunk, VectorIndex};

pub struct CountingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.25; 8])
    }

    fn dimension(&self) -> usize {
        8
    }
}

fn chunk(
    id: &str,
    source: &str,
    title: &str,
    section: Option<&str>,
    domain: AgentDomain,
) -> Chunk {
    Chunk {
        chunk_id: id.to_string(),
        document_id: id.to_string(),
        text: format!("Book passage from {title}."),
        source: source.to_string(),
        title: title.to_string(),
        section: section.map(String::from),
        domain,
    }
}

/// Serves a small fixed corpus keyed by domain filter
pub struct BookIndex {
    pub calls: AtomicUsize,
}

#[async_trait]
impl VectorIndex for BookIndex {
    async fn search(
        &self,
        _vector: &[f32],
        limit: usize,
        _score_floor: f32,
        domain: Option<AgentDomain>,
    ) -> Result<Vec<ScoredChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut hits = match domain {
            Some(AgentDomain::Glossary) => vec![
                ScoredChunk {
                    chunk: chunk(
                        "g1",
                        "docs/module1-ros2/topics.md",
                        "ROS 2 Topics",
                        Some("Messaging"),
                        AgentDomain::Glossary,
                    ),
                    score: 0.92,
                },
                ScoredChunk {
                    chunk: chunk(
                        "g2",
                        "docs/module1-ros2/nodes.md",
                        "ROS 2 Nodes",
                        None,
                        AgentDomain::Glossary,
                    ),
                    score: 0.81,
                },
            ],
            Some(AgentDomain::Hardware) => vec![
                ScoredChunk {
                    chunk: chunk(
                        "h1",
                        "docs/hardware/workstation.md",
                        "Workstation Requirements",
                        Some("GPU"),
                        AgentDomain::Hardware,
                    ),
                    score: 0.88,
                },
                ScoredChunk {
                    chunk: chunk(
                        "h2",
                        "docs/hardware/jetson.md",
                        "Jetson Edge Kits",
                        Some("Orin"),
                        AgentDomain::Hardware,
                    ),
                    score: 0.74,
                },
            ],
            Some(AgentDomain::ModuleInfo) => vec![
                ScoredChunk {
                    chunk: chunk(
                        "m1",
                        "docs/module3-isaac/sensors.md",
                        "Isaac Sensors",
                        Some("Overview"),
                        AgentDomain::ModuleInfo,
                    ),
                    score: 0.9,
                },
                // Shared with the hardware domain results: same
                // (source, section), so multi-agent merge must dedup it
                ScoredChunk {
                    chunk: chunk(
                        "h1",
                        "docs/hardware/workstation.md",
                        "Workstation Requirements",
                        Some("GPU"),
                        AgentDomain::ModuleInfo,
                    ),
                    score: 0.72,
                },
            ],
            Some(AgentDomain::Capstone) => vec![ScoredChunk {
                chunk: chunk(
                    "c1",
                    "docs/capstone/milestones.md",
                    "Capstone Milestones",
                    Some("Pipeline"),
                    AgentDomain::Capstone,
                ),
                score: 0.85,
            }],
            Some(AgentDomain::General) | None => vec![ScoredChunk {
                chunk: chunk("b1", "docs/intro.md", "Introduction", None, AgentDomain::General),
                score: 0.55,
            }],
        };
        hits.truncate(limit);
        Ok(hits)
    }

    async fn collection_dimension(&self) -> Result<u64> {
        Ok(8)
    }
}

/// Always-unavailable index for failure-path tests
pub struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn search(
        &self,
        _vector: &[f32],
        _limit: usize,
        _score_floor: f32,
        _domain: Option<AgentDomain>,
    ) -> Result<Vec<ScoredChunk>> {
        Err(ChatbotError::RetrievalUnavailable("connection refused".to_string()))
    }

    async fn collection_dimension(&self) -> Result<u64> {
        Err(ChatbotError::RetrievalUnavailable("connection refused".to_string()))
    }
}

/// Replays a fixed token script and records every request it serves
pub struct ScriptedChat {
    pub tokens: Vec<String>,
    pub token_delay: Duration,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChat {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            token_delay: Duration::from_millis(2),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn answer_with_citation() -> Self {
        Self::new(&["The book explains this ", "clearly [Source 1].", " See the module for more."])
    }

    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);

        let tokens = self.tokens.clone();
        let delay = self.token_delay;
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for token in tokens {
                tokio::time::sleep(delay).await;
                if tx.send(Ok(token)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// The real pipeline over mock collaborators
pub struct TestHarness {
    pub pipeline: Arc<RagPipeline>,
    pub registry: Arc<AgentRegistry>,
    pub sessions: SessionContextSkill,
    pub embedder: Arc<CountingEmbedder>,
    pub index: Arc<BookIndex>,
    pub chat: Arc<ScriptedChat>,
}

pub fn harness() -> TestHarness {
    harness_with_chat(ScriptedChat::answer_with_citation())
}

pub fn harness_with_chat(chat: ScriptedChat) -> TestHarness {
    let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
    let index = Arc::new(BookIndex { calls: AtomicUsize::new(0) });
    let chat = Arc::new(chat);

    let retrieval = Arc::new(RetrievalSkill::new(
        embedder.clone(),
        index.clone(),
        RetrievalConfig::default(),
    ));
    let sessions = SessionContextSkill::new(Arc::new(MemorySessionStore::new()), 10);
    let core = AgentCore::new(retrieval, chat.clone());

    let registry = Arc::new(build_registry(core));
    let router = Arc::new(QueryRouter::new(registry.clone(), 0.3, 2));
    let pipeline = Arc::new(RagPipeline::new(
        registry.clone(),
        router,
        sessions.clone(),
        Duration::from_secs(5),
    ));

    TestHarness { pipeline, registry, sessions, embedder, index, chat }
}

/// Pipeline whose vector store is unreachable
pub fn harness_with_down_index() -> (Arc<RagPipeline>, SessionContextSkill) {
    let embedder = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
    let retrieval = Arc::new(RetrievalSkill::new(
        embedder,
        Arc::new(DownIndex),
        RetrievalConfig::default(),
    ));
    let sessions = SessionContextSkill::new(Arc::new(MemorySessionStore::new()), 10);
    let core = AgentCore::new(retrieval, Arc::new(ScriptedChat::answer_with_citation()));

    let registry = Arc::new(build_registry(core));
    let router = Arc::new(QueryRouter::new(registry.clone(), 0.3, 2));
    let pipeline =
        Arc::new(RagPipeline::new(registry, router, sessions.clone(), Duration::from_secs(5)));
    (pipeline, sessions)
}

fn build_registry(core: AgentCore) -> AgentRegistry {
    let mut registry = AgentRegistry::new("book");
    registry.register(Arc::new(GlossaryAgent::new(core.clone()))).unwrap();
    registry.register(Arc::new(HardwareAgent::new(core.clone()))).unwrap();
    registry.register(Arc::new(ModuleInfoAgent::new(core.clone()))).unwrap();
    registry.register(Arc::new(CapstoneAgent::new(core.clone()))).unwrap();
    registry.register(Arc::new(BookAgent::new(core))).unwrap();
    registry.validate().unwrap();
    registry
}
