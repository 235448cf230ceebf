//! Incremental parser for `data:` framed event-stream bytes.
//!
//! Network chunks split mid-line and mid-codepoint; the parser buffers
//! raw bytes and only converts complete lines.

use crate::errors::{ChatbotError, Result};

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Accumulates bytes and yields complete `data:` payloads
#[derive(Debug)]
pub struct SseLineParser {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self { buffer: Vec::with_capacity(4096), max_buffer_size }
    }

    /// Add bytes and return every `data:` payload completed by them.
    ///
    /// Non-data lines (comments, `event:` fields, blank separators) are
    /// skipped. Partial trailing lines stay buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(ChatbotError::LlmUnavailable(format!(
                "stream buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }

        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim_start();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }

        Ok(payloads)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for SseLineParser {
    fn default() -> Self {
        Self::new()
    }
}
