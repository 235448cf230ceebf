//! Vector store access over Qdrant.
//!
//! The core assumes cosine similarity and a payload schema with keys
//! `text`, `source`, `title`, `section`, `domain` (plus ids). Chunks
//! without a `domain` tag behave as `general`.

use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, r#match::MatchValue, value::Kind,
        vectors_config::Config as VectorsConfigKind, with_payload_selector::SelectorOptions,
        Condition, FieldCondition, Filter, Match, SearchPoints, Value as QdrantValue,
        WithPayloadSelector,
    },
};
use std::collections::HashMap;

use crate::config::QdrantConfig;
use crate::errors::{ChatbotError, Result};
use crate::types::{AgentDomain, Chunk};

/// One raw search hit before ranks are assigned
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Narrow search interface over the chunk collection
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest-neighbor search, optionally restricted to a domain tag.
    /// Results are ordered by descending score.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_floor: f32,
        domain: Option<AgentDomain>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Vector size of the backing collection
    async fn collection_dimension(&self) -> Result<u64>;
}

/// Qdrant-backed chunk index
pub struct QdrantStore {
    client: QdrantClient,
    collection: String,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let mut builder = QdrantClient::from_url(&config.url);
        if let Some(key) = &config.api_key {
            builder = builder.with_api_key(key.as_str());
        }
        let client = builder
            .build()
            .map_err(|e| ChatbotError::ConfigError(format!("qdrant client: {e}")))?;

        Ok(Self { client, collection: config.collection.clone() })
    }

    /// Fatal startup check: the collection's vector size must match the
    /// embedding provider's output dimension.
    pub async fn verify_dimension(&self, expected: u64) -> Result<()> {
        let actual = self.collection_dimension().await?;
        if actual != expected {
            return Err(ChatbotError::ConfigError(format!(
                "collection '{}' has vector size {actual}, embedding dimension is {expected}",
                self.collection
            )));
        }
        Ok(())
    }

    fn domain_filter(domain: AgentDomain) -> Filter {
        Filter {
            must: vec![Condition {
                condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                    key: "domain".to_string(),
                    r#match: Some(Match {
                        match_value: Some(MatchValue::Keyword(domain.as_str().to_string())),
                    }),
                    ..Default::default()
                })),
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_floor: f32,
        domain: Option<AgentDomain>,
    ) -> Result<Vec<ScoredChunk>> {
        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: vector.to_vec(),
                limit: limit as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                score_threshold: Some(score_floor),
                filter: domain.map(Self::domain_filter),
                ..Default::default()
            })
            .await
            .map_err(|e| ChatbotError::RetrievalUnavailable(format!("qdrant search: {e}")))?;

        let chunks = search_result
            .result
            .into_iter()
            .map(|point| {
                let id = point_id_to_string(&point.id);
                ScoredChunk { chunk: chunk_from_payload(id, point.payload), score: point.score }
            })
            .collect();

        Ok(chunks)
    }

    async fn collection_dimension(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| ChatbotError::RetrievalUnavailable(format!("collection info: {e}")))?;

        info.result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|kind| match kind {
                VectorsConfigKind::Params(params) => Some(params.size),
                VectorsConfigKind::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                ChatbotError::ConfigError(format!(
                    "collection '{}' has no single-vector configuration",
                    self.collection
                ))
            })
    }
}

/// Map a Qdrant payload onto the chunk schema
fn chunk_from_payload(chunk_id: String, payload: HashMap<String, QdrantValue>) -> Chunk {
    let get = |key: &str| payload.get(key).and_then(value_as_string).unwrap_or_default();
    let section = payload.get("section").and_then(value_as_string).filter(|s| !s.is_empty());
    let domain = payload
        .get("domain")
        .and_then(|v| value_as_string(v))
        .map(|tag| AgentDomain::parse(&tag))
        .unwrap_or(AgentDomain::General);

    Chunk {
        chunk_id,
        document_id: get("document_id"),
        text: get("text"),
        source: get("source"),
        title: get("title"),
        section,
        domain,
    }
}

fn value_as_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    })
}

fn point_id_to_string(point_id: &Option<qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    point_id
        .as_ref()
        .and_then(|id| id.point_id_options.as_ref())
        .map(|options| match options {
            PointIdOptions::Num(n) => n.to_string(),
            PointIdOptions::Uuid(u) => u.clone(),
        })
        .unwrap_or_else(|| "unknown".to_string())
}
