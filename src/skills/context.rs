//! Session context: the rolling window of recent turns per session.
//!
//! Writes serialize per store; trimming happens at write time. The
//! anonymous session is ephemeral and never persisted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::{ChatbotError, Result};
use crate::types::{SessionMessage, ANONYMOUS_SESSION};

/// Key/value message storage by session id
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Append a message, trimming the session to `window` entries
    async fn append(&self, session_id: &str, message: SessionMessage, window: usize)
        -> Result<()>;

    /// Fetch up to `limit` most recent messages, oldest first
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<SessionMessage>>;
}

/// In-process session storage.
///
/// A single async mutex serializes writes, so final ordering matches
/// acceptance order at the call site.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<SessionMessage>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionStore {
    async fn append(
        &self,
        session_id: &str,
        message: SessionMessage,
        window: usize,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let messages = sessions.entry(session_id.to_string()).or_default();
        messages.push(message);
        if messages.len() > window {
            let excess = messages.len() - window;
            messages.drain(..excess);
        }
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<SessionMessage>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(session_id)
            .map(|messages| {
                let start = messages.len().saturating_sub(limit);
                messages[start..].to_vec()
            })
            .unwrap_or_default())
    }
}

/// Skill wrapping the session backend for agents and the pipeline
#[derive(Clone)]
pub struct SessionContextSkill {
    backend: Arc<dyn SessionBackend>,
    window: usize,
}

impl SessionContextSkill {
    pub fn new(backend: Arc<dyn SessionBackend>, window: usize) -> Self {
        Self { backend, window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Get conversation history, oldest first.
    ///
    /// Backend failures degrade to an empty window; a missing history
    /// never fails a request.
    pub async fn get_history(&self, session_id: &str, limit: Option<usize>) -> Vec<SessionMessage> {
        if session_id == ANONYMOUS_SESSION {
            return Vec::new();
        }
        let limit = limit.unwrap_or(self.window).min(self.window);
        match self.backend.recent(session_id, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id, error = %e, "could not retrieve session history");
                Vec::new()
            }
        }
    }

    /// Append a message at a turn boundary.
    ///
    /// Write failures are logged and swallowed; they never surface to
    /// the user-visible flow.
    pub async fn save_message(&self, session_id: &str, message: SessionMessage) {
        if session_id == ANONYMOUS_SESSION {
            debug!("anonymous session, skipping persistence");
            return;
        }
        if let Err(e) = self.backend.append(session_id, message, self.window).await {
            let e = ChatbotError::SessionWriteFailure(e.to_string());
            warn!(session_id, error = %e, "session write failed");
        }
    }

    /// Format a history window for inclusion in an LLM prompt
    pub fn format_history(messages: &[SessionMessage]) -> String {
        if messages.is_empty() {
            return String::new();
        }
        let mut parts = vec!["Previous conversation:".to_string()];
        for msg in messages {
            let role = match msg.role {
                crate::types::Role::User => "User",
                crate::types::Role::Assistant => "Assistant",
            };
            parts.push(format!("{role}: {}", msg.content));
        }
        parts.join("\n")
    }
}
