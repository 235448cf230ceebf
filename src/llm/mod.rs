//! Streaming LLM access.
//!
//! The provider is an OpenAI-compatible chat-completions endpoint; the
//! core consumes tokens as they arrive and forwards them as `text` events.

pub mod client;
pub mod sse;

pub use client::{ChatCompletionsClient, ChatModel, CompletionRequest};
