//! Error types for the bookbuddy query-handling core.
//!
//! The pipeline is the single point that translates these into stream
//! events; agents never raise across the streaming boundary.

use thiserror::Error;

/// Main error type for the chatbot core
#[derive(Error, Debug)]
pub enum ChatbotError {
    /// Empty or meaningless query
    #[error("Invalid query: {0}")]
    QueryInvalid(String),

    /// Query over the character budget
    #[error("Query length {len} exceeds maximum of {max} characters")]
    QueryTooLong { len: usize, max: usize },

    /// Selected text outside its length bounds
    #[error("Selected text length {len} outside allowed range {min}..={max}")]
    SelectedTextInvalid { len: usize, min: usize, max: usize },

    /// Vector store or embedding failure during retrieval
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Completion provider failure or stream interruption
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// Unexpected agent-side failure
    #[error("Agent '{agent}' failed: {message}")]
    AgentFailure { agent: String, message: String },

    /// Agent exceeded its hard timeout
    #[error("Agent '{agent}' exceeded hard timeout of {seconds}s")]
    AgentTimeout { agent: String, seconds: u64 },

    /// Lookup of an unregistered agent name
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Session store write failure (non-fatal; logged, never surfaced)
    #[error("Session write failed: {0}")]
    SessionWriteFailure(String),

    /// Query lifecycle state machine violation
    #[error("Invalid query state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Agent registry construction errors
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, ChatbotError>;

impl ChatbotError {
    /// User-visible message for stream `error` events.
    ///
    /// Kept domain-agnostic and free of implementation detail.
    pub fn user_message(&self) -> String {
        match self {
            ChatbotError::QueryInvalid(_) => {
                "Please enter a question so I can search the book.".to_string()
            }
            ChatbotError::QueryTooLong { max, .. } => {
                format!("Your question is too long. Please keep it under {max} characters.")
            }
            ChatbotError::SelectedTextInvalid { min, max, .. } => {
                format!("Selected text must be between {min} and {max} characters.")
            }
            ChatbotError::RetrievalUnavailable(_) => {
                "The book index is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            ChatbotError::LlmUnavailable(_) => {
                "The answer service is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            ChatbotError::AgentTimeout { .. } => {
                "Answering took too long and was cancelled. Please try again.".to_string()
            }
            ChatbotError::UnknownAgent(name) => format!("No agent named '{name}' is registered."),
            _ => "Something went wrong while answering your question. Please try again."
                .to_string(),
        }
    }

    /// Whether this error may be retried through the fallback agent.
    pub fn is_agent_failure(&self) -> bool {
        matches!(self, ChatbotError::AgentFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatbotError::QueryTooLong { len: 2500, max: 2000 };
        assert!(err.to_string().contains("2500"));
        assert!(err.to_string().contains("2000"));
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = ChatbotError::RetrievalUnavailable("qdrant connect refused 6334".to_string());
        let msg = err.user_message();
        assert!(!msg.contains("qdrant"));
        assert!(!msg.contains("6334"));
    }

    #[test]
    fn test_agent_failure_is_retryable() {
        let err = ChatbotError::AgentFailure {
            agent: "glossary".to_string(),
            message: "channel closed".to_string(),
        };
        assert!(err.is_agent_failure());
        assert!(!ChatbotError::QueryInvalid("empty".to_string()).is_agent_failure());
    }
}
