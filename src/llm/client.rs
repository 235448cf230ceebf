//! OpenAI-compatible streaming chat-completions client.
//!
//! Tokens are forwarded over a bounded channel as they arrive; dropping
//! the receiver cancels the read loop at its next suspension point.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::LlmConfig;
use crate::errors::{ChatbotError, Result};
use crate::llm::sse::SseLineParser;
use crate::types::{Role, SessionMessage};

/// Request timeout covering the full streamed completion
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Token channel depth
const TOKEN_CHANNEL_CAPACITY: usize = 32;

/// One streaming completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub history: Vec<SessionMessage>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Streaming chat-completion provider
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a completion; tokens arrive on the returned channel in
    /// model output order. The channel closes after the final token or
    /// after a single `Err` item.
    async fn stream_chat(&self, request: CompletionRequest)
        -> Result<mpsc::Receiver<Result<String>>>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ChatbotError::HttpError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(request: &CompletionRequest) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(WireMessage { role: "system", content: request.system.clone() });
        for msg in &request.history {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(WireMessage { role, content: msg.content.clone() });
        }
        messages.push(WireMessage { role: "user", content: request.user.clone() });
        messages
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    async fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = CompletionBody {
            model: self.model.clone(),
            messages: Self::build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ChatbotError::LlmUnavailable(format!("failed to send request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(ChatbotError::LlmUnavailable(format!("HTTP {status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut parser = SseLineParser::new();
            let mut completed = false;

            'outer: while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChatbotError::LlmUnavailable(format!(
                                "stream read failed: {e}"
                            ))))
                            .await;
                        return;
                    }
                };

                let payloads = match parser.push(&bytes) {
                    Ok(payloads) => payloads,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                for payload in payloads {
                    if payload == "[DONE]" {
                        completed = true;
                        break 'outer;
                    }
                    match serde_json::from_str::<CompletionChunk>(&payload) {
                        Ok(chunk) => {
                            let choice = chunk.choices.into_iter().next();
                            if let Some(choice) = &choice {
                                if choice.finish_reason.is_some() {
                                    completed = true;
                                }
                            }
                            if let Some(token) =
                                choice.and_then(|c| c.delta.content).filter(|t| !t.is_empty())
                            {
                                // Receiver dropped means the caller cancelled
                                if tx.send(Ok(token)).await.is_err() {
                                    debug!("completion receiver dropped, stopping read loop");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(ChatbotError::LlmUnavailable(format!(
                                    "malformed stream payload: {e}"
                                ))))
                                .await;
                            return;
                        }
                    }
                }
            }

            if !completed {
                let _ = tx
                    .send(Err(ChatbotError::LlmUnavailable(
                        "completion stream ended unexpectedly".to_string(),
                    )))
                    .await;
            }
        });

        Ok(rx)
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    delta: CompletionDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CompletionDelta {
    #[serde(default)]
    content: Option<String>,
}
