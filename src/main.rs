//! Service entry point: wire configuration, collaborators, skills,
//! agents, and the HTTP surface together.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookbuddy::agents::{
    AgentCore, AgentRegistry, BookAgent, CapstoneAgent, GlossaryAgent, HardwareAgent,
    ModuleInfoAgent, QueryRouter,
};
use bookbuddy::config::Config;
use bookbuddy::embedding::{EmbeddingProvider, HttpEmbeddingClient};
use bookbuddy::http::{self, AppState};
use bookbuddy::llm::ChatCompletionsClient;
use bookbuddy::pipeline::RagPipeline;
use bookbuddy::skills::{MemorySessionStore, RetrievalSkill, SessionContextSkill};
use bookbuddy::vector::QdrantStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;

    // External collaborators
    let embedder = Arc::new(
        HttpEmbeddingClient::new(&config.embedding).context("building embedding client")?,
    );
    let store = Arc::new(QdrantStore::new(&config.qdrant).context("building qdrant client")?);
    store
        .verify_dimension(embedder.dimension() as u64)
        .await
        .context("embedding dimension must match the vector collection")?;
    let llm =
        Arc::new(ChatCompletionsClient::new(&config.llm).context("building completion client")?);

    // Shared skills
    let retrieval =
        Arc::new(RetrievalSkill::new(embedder, store, config.retrieval.clone()));
    let sessions =
        SessionContextSkill::new(Arc::new(MemorySessionStore::new()), config.history.window);
    let core = AgentCore::new(retrieval, llm)
        .with_soft_timeout(Duration::from_secs(config.agent.soft_timeout_s));

    // Agent registry: built once, read-only afterwards
    let mut registry = AgentRegistry::new(config.agent.default_agent.clone());
    registry.register(Arc::new(GlossaryAgent::new(core.clone())))?;
    registry.register(Arc::new(HardwareAgent::new(core.clone())))?;
    registry.register(Arc::new(ModuleInfoAgent::new(core.clone())))?;
    registry.register(Arc::new(CapstoneAgent::new(core.clone())))?;
    registry.register(Arc::new(BookAgent::new(core)))?;
    registry.validate()?;
    let registry = Arc::new(registry);

    let router = Arc::new(QueryRouter::new(
        registry.clone(),
        config.router.confidence_threshold,
        config.router.secondary_topk,
    ));
    let pipeline = Arc::new(RagPipeline::new(
        registry.clone(),
        router,
        sessions,
        Duration::from_secs(config.agent.hard_timeout_s),
    ));

    let app = http::router(AppState { pipeline, registry });
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener =
        tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "bookbuddy listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}
