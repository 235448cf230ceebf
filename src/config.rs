//! Environment-driven configuration.
//!
//! Every recognized option has a default; deployments override through
//! environment variables (`ROUTER_CONFIDENCE_THRESHOLD`, `QDRANT_URL`, ...).

use serde::{Deserialize, Serialize};

use crate::errors::{ChatbotError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub router: RouterConfig,
    pub retrieval: RetrievalConfig,
    pub history: HistoryConfig,
    pub agent: AgentConfig,
    pub qdrant: QdrantConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum primary score before falling back to the default agent
    pub confidence_threshold: f32,
    /// Maximum secondaries considered for multi-domain execution
    pub secondary_topk: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { confidence_threshold: 0.3, secondary_topk: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub score_floor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_limit: 5, max_limit: 20, score_floor: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Messages kept per session; oldest evicted at write time
    pub window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { window: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Past this many seconds an agent stops at its next suspension point
    pub soft_timeout_s: u64,
    /// Past this many seconds the pipeline aborts the agent stream
    pub hard_timeout_s: u64,
    /// Name of the fallback agent
    pub default_agent: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            soft_timeout_s: 20,
            hard_timeout_s: 30,
            default_agent: "book".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "physical_ai_book".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Must match the vector collection; verified at startup
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: None,
            model: "text-embedding-004".to_string(),
            dimension: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            retrieval: RetrievalConfig::default(),
            history: HistoryConfig::default(),
            agent: AgentConfig::default(),
            qdrant: QdrantConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Keeps parsing testable without mutating process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(v) = get("ROUTER_CONFIDENCE_THRESHOLD") {
            config.router.confidence_threshold = parse(&v, "ROUTER_CONFIDENCE_THRESHOLD")?;
        }
        if let Some(v) = get("ROUTER_SECONDARY_TOPK") {
            config.router.secondary_topk = parse(&v, "ROUTER_SECONDARY_TOPK")?;
        }
        if let Some(v) = get("RETRIEVAL_DEFAULT_LIMIT") {
            config.retrieval.default_limit = parse(&v, "RETRIEVAL_DEFAULT_LIMIT")?;
        }
        if let Some(v) = get("RETRIEVAL_MAX_LIMIT") {
            config.retrieval.max_limit = parse(&v, "RETRIEVAL_MAX_LIMIT")?;
        }
        if let Some(v) = get("RETRIEVAL_SCORE_FLOOR") {
            config.retrieval.score_floor = parse(&v, "RETRIEVAL_SCORE_FLOOR")?;
        }
        if let Some(v) = get("HISTORY_WINDOW") {
            config.history.window = parse(&v, "HISTORY_WINDOW")?;
        }
        if let Some(v) = get("AGENT_SOFT_TIMEOUT_S") {
            config.agent.soft_timeout_s = parse(&v, "AGENT_SOFT_TIMEOUT_S")?;
        }
        if let Some(v) = get("AGENT_HARD_TIMEOUT_S") {
            config.agent.hard_timeout_s = parse(&v, "AGENT_HARD_TIMEOUT_S")?;
        }
        if let Some(v) = get("AGENT_DEFAULT") {
            config.agent.default_agent = v;
        }
        if let Some(v) = get("QDRANT_URL") {
            config.qdrant.url = v;
        }
        config.qdrant.api_key = get("QDRANT_API_KEY");
        if let Some(v) = get("QDRANT_COLLECTION") {
            config.qdrant.collection = v;
        }
        if let Some(v) = get("EMBEDDING_BASE_URL") {
            config.embedding.base_url = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION") {
            config.embedding.dimension = parse(&v, "EMBEDDING_DIMENSION")?;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            config.llm.base_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            config.llm.model = v;
        }
        // One key serves both clients when they share a provider
        let api_key = get("LLM_API_KEY");
        config.llm.api_key = api_key.clone();
        if config.embedding.api_key.is_none() {
            config.embedding.api_key = get("EMBEDDING_API_KEY").or(api_key);
        }
        if let Some(v) = get("HOST") {
            config.server.host = v;
        }
        if let Some(v) = get("PORT") {
            config.server.port = parse(&v, "PORT")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject option combinations that cannot work
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.router.confidence_threshold) {
            return Err(ChatbotError::ConfigError(
                "ROUTER_CONFIDENCE_THRESHOLD must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.retrieval.default_limit == 0 || self.retrieval.max_limit == 0 {
            return Err(ChatbotError::ConfigError(
                "retrieval limits must be positive".to_string(),
            ));
        }
        if self.retrieval.default_limit > self.retrieval.max_limit {
            return Err(ChatbotError::ConfigError(
                "RETRIEVAL_DEFAULT_LIMIT cannot exceed RETRIEVAL_MAX_LIMIT".to_string(),
            ));
        }
        if self.history.window == 0 {
            return Err(ChatbotError::ConfigError(
                "HISTORY_WINDOW must be positive".to_string(),
            ));
        }
        if self.agent.soft_timeout_s >= self.agent.hard_timeout_s {
            return Err(ChatbotError::ConfigError(
                "AGENT_SOFT_TIMEOUT_S must be below AGENT_HARD_TIMEOUT_S".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ChatbotError::ConfigError(
                "EMBEDDING_DIMENSION must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ChatbotError::ConfigError(format!("invalid value '{value}' for {key}")))
}
