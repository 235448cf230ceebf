//! Citation numbering and `[Source N]` formatting.
//!
//! Numbering is 1-based and stable within one answer: first appearance
//! wins, duplicates by `(source, section)` collapse keeping the highest
//! score, and markers that point outside the prompt context are dropped
//! before emission.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::types::{Citation, RetrievedPassage};

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Source (\d+)\]").expect("marker regex"));

/// Longest prefix a split `[Source N]` marker can occupy at a chunk tail
const MARKER_HOLDBACK_MAX: usize = 16;

/// Stateless citation operations
pub struct CitationSkill;

impl CitationSkill {
    /// Collapse passages sharing `(source, section)`, keeping the highest
    /// score, in first-appearance order. Ranks are reassigned 1..N.
    pub fn dedupe_passages(passages: &[RetrievedPassage]) -> Vec<RetrievedPassage> {
        let mut seen: HashMap<(String, Option<String>), usize> = HashMap::new();
        let mut deduped: Vec<RetrievedPassage> = Vec::new();

        for passage in passages {
            let key = (passage.chunk.source.clone(), passage.chunk.section.clone());
            match seen.get(&key) {
                Some(&idx) => {
                    if passage.score > deduped[idx].score {
                        let rank = deduped[idx].rank;
                        deduped[idx] = passage.clone();
                        deduped[idx].rank = rank;
                    }
                }
                None => {
                    seen.insert(key, deduped.len());
                    let mut passage = passage.clone();
                    passage.rank = deduped.len() + 1;
                    deduped.push(passage);
                }
            }
        }

        deduped
    }

    /// Number deduplicated passages into citation objects
    pub fn format_citations(passages: &[RetrievedPassage]) -> Vec<Citation> {
        passages
            .iter()
            .enumerate()
            .map(|(i, passage)| Citation {
                index: i + 1,
                source: passage.chunk.source.clone(),
                title: passage.chunk.title.clone(),
                section: passage.chunk.section.clone(),
                relevance_score: passage.score,
            })
            .collect()
    }

    /// Build the numbered-passage block handed to the LLM.
    ///
    /// Numbering here must match `format_citations` on the same slice.
    pub fn build_prompt_context(
        passages: &[RetrievedPassage],
        selected_text: Option<&str>,
    ) -> String {
        let mut parts = Vec::new();

        if let Some(selected) = selected_text {
            parts.push(format!("USER SELECTED TEXT:\n{selected}\n"));
        }

        if passages.is_empty() {
            parts.push("No relevant content found in the book for this query.".to_string());
        } else {
            parts.push("RELEVANT BOOK CONTENT:".to_string());
            for (i, passage) in passages.iter().enumerate() {
                let section_info = passage
                    .chunk
                    .section
                    .as_deref()
                    .map(|s| format!(" > {s}"))
                    .unwrap_or_default();
                parts.push(format!(
                    "\n[Source {}] {}{}\nPath: {}\n{}",
                    i + 1,
                    passage.chunk.title,
                    section_info,
                    passage.chunk.source,
                    passage.chunk.text
                ));
            }
        }

        parts.join("\n")
    }

    /// Merge citation lists from multiple agents: dedup by
    /// `(source, section)` keeping the highest relevance, then renumber
    /// 1..N in first-appearance order.
    pub fn merge_citations(lists: &[Vec<Citation>]) -> Vec<Citation> {
        let mut seen: HashMap<(String, Option<String>), usize> = HashMap::new();
        let mut merged: Vec<Citation> = Vec::new();

        for citation in lists.iter().flatten() {
            let key = citation.dedup_key();
            match seen.get(&key) {
                Some(&idx) => {
                    if citation.relevance_score > merged[idx].relevance_score {
                        merged[idx].relevance_score = citation.relevance_score;
                    }
                }
                None => {
                    seen.insert(key, merged.len());
                    let mut citation = citation.clone();
                    citation.index = merged.len() + 1;
                    merged.push(citation);
                }
            }
        }

        merged
    }

    /// Drop `[Source k]` markers with k outside 1..=max_index
    pub fn scrub_markers(text: &str, max_index: usize) -> String {
        MARKER_RE
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let index: usize = caps[1].parse().unwrap_or(0);
                if index >= 1 && index <= max_index {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned()
    }
}

/// Incremental marker scrubbing for streamed text.
///
/// Tokens can split a `[Source N]` marker across chunk boundaries; a
/// short tail that could still become a marker is held back until it
/// resolves.
#[derive(Debug)]
pub struct MarkerScrubber {
    max_index: usize,
    carry: String,
}

impl MarkerScrubber {
    pub fn new(max_index: usize) -> Self {
        Self { max_index, carry: String::new() }
    }

    /// Feed a chunk; returns the scrubbed text safe to emit now
    pub fn push(&mut self, chunk: &str) -> String {
        self.carry.push_str(chunk);
        let hold = holdback_position(&self.carry);
        let ready: String = self.carry.drain(..hold).collect();
        CitationSkill::scrub_markers(&ready, self.max_index)
    }

    /// Flush any held-back tail at end of stream
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.carry);
        CitationSkill::scrub_markers(&rest, self.max_index)
    }
}

/// Byte offset up to which the buffer cannot be part of an unfinished
/// marker. Everything past it is held back.
fn holdback_position(buffer: &str) -> usize {
    if let Some(pos) = buffer.rfind('[') {
        let tail = &buffer[pos..];
        if tail.len() < MARKER_HOLDBACK_MAX && is_marker_prefix(tail) {
            return pos;
        }
    }
    buffer.len()
}

fn is_marker_prefix(tail: &str) -> bool {
    const PREFIX: &str = "[Source ";
    if tail.len() <= PREFIX.len() {
        PREFIX.starts_with(tail)
    } else {
        tail.starts_with(PREFIX)
            && tail[PREFIX.len()..].chars().all(|c| c.is_ascii_digit())
    }
}
