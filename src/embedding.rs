//! Query embedding via a remote OpenAI-compatible `/embeddings` endpoint.
//!
//! The output dimension is fixed per deployment and must match the vector
//! collection; `main` verifies this at startup.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::errors::{ChatbotError, Result};

/// Request timeout for a single embedding call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Produces fixed-length float vectors for text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed output dimension of this provider
    fn dimension(&self) -> usize;
}

/// HTTP embedding client against an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ChatbotError::HttpError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest { model: self.model.clone(), input: text.to_string() };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(ChatbotError::RetrievalUnavailable(format!(
                "embedding request failed: HTTP {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                ChatbotError::RetrievalUnavailable("embedding response was empty".to_string())
            })?;

        if vector.len() != self.dimension {
            return Err(ChatbotError::RetrievalUnavailable(format!(
                "embedding dimension {} does not match configured {}",
                vector.len(),
                self.dimension
            )));
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = EmbeddingConfig::default();
        let client = HttpEmbeddingClient::new(&config).unwrap();
        assert_eq!(client.dimension(), 768);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = EmbeddingConfig {
            base_url: "http://localhost:8081/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let client = HttpEmbeddingClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8081/v1");
    }

    #[test]
    fn test_embedding_response_parsing() {
        let json = r#"{"data": [{"embedding": [0.1, 0.2, 0.3]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data[0].embedding.len(), 3);
    }
}
