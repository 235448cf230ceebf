//! Domain-filtered vector retrieval with single-flight coalescing.
//!
//! Concurrent calls sharing a normalized `(query, filter, limit, floor)`
//! key share one downstream embed + search round trip. Coalescing does
//! not outlive the request batch: the keyed entry is removed as soon as
//! its call completes, so this is not a response cache.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::errors::{ChatbotError, Result};
use crate::types::{AgentDomain, RetrievedPassage};
use crate::vector::VectorIndex;

type SharedPassages = Arc<Vec<RetrievedPassage>>;

/// Top-K passage retrieval over the chunk collection
pub struct RetrievalSkill {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<SharedPassages>>>>,
}

impl RetrievalSkill {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self { embedder, index, config, in_flight: Mutex::new(HashMap::new()) }
    }

    /// Retrieve the top passages for a query, optionally restricted to a
    /// domain tag. Results are ordered by descending score with dense
    /// 1-based ranks.
    pub async fn retrieve(
        &self,
        query: &str,
        domain_filter: Option<AgentDomain>,
        limit: Option<usize>,
        score_floor: Option<f32>,
    ) -> Result<Vec<RetrievedPassage>> {
        let limit = limit.unwrap_or(self.config.default_limit).clamp(1, self.config.max_limit);
        let score_floor = score_floor.unwrap_or(self.config.score_floor);
        let key = normalize_key(query, domain_filter, limit, score_floor);

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell
            .get_or_try_init(|| async {
                debug!(%key, "retrieval round trip");
                self.fetch(query, domain_filter, limit, score_floor).await.map(Arc::new)
            })
            .await
            .cloned();

        // Drop the entry once this batch resolves; a later identical
        // request starts its own round trip.
        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(current) = in_flight.get(&key) {
                if Arc::ptr_eq(current, &cell) {
                    in_flight.remove(&key);
                }
            }
        }

        result.map(|shared| shared.as_ref().clone())
    }

    async fn fetch(
        &self,
        query: &str,
        domain_filter: Option<AgentDomain>,
        limit: usize,
        score_floor: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        let vector = self.embedder.embed(query).await.map_err(into_retrieval_err)?;
        let hits = self
            .index
            .search(&vector, limit, score_floor, domain_filter)
            .await
            .map_err(into_retrieval_err)?;

        let mut hits = hits;
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| RetrievedPassage { chunk: hit.chunk, score: hit.score, rank: i + 1 })
            .collect())
    }
}

fn into_retrieval_err(e: ChatbotError) -> ChatbotError {
    match e {
        ChatbotError::RetrievalUnavailable(_) => e,
        other => ChatbotError::RetrievalUnavailable(other.to_string()),
    }
}

/// Normalized single-flight key: lowercased query with collapsed
/// whitespace, plus the filter and bounds.
fn normalize_key(
    query: &str,
    domain_filter: Option<AgentDomain>,
    limit: usize,
    score_floor: f32,
) -> String {
    let normalized: Vec<&str> = query.split_whitespace().collect();
    let filter = domain_filter.map(|d| d.as_str()).unwrap_or("*");
    format!("{}|{filter}|{limit}|{score_floor:.4}", normalized.join(" ").to_lowercase())
}
