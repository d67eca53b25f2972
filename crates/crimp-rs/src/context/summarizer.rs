//! Segment compression through the downstream completion service.
//!
//! The summarizer sends a fixed compression instruction plus the formatted
//! to-compress segment to the completion backend and measures the resulting
//! summary with the token oracle. When the backend fails (timeout, error
//! response, empty output) it falls back to a pure truncation heuristic, so
//! compression always yields usable text without throwing.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::upstream::{CompletionBackend, CompletionRequest};
use crate::Message;

use super::tokenizer::{coarse_estimate, TokenOracle};

/// The instruction sent with every compression call. Asks for a dense,
/// factual digest that can stand in for the original messages.
const COMPRESSION_PROMPT: &str = "\
Condense the following conversation history into a short summary. Focus on:
- Facts established and decisions made
- Questions asked and how they were answered
- Anything the participants would need to continue the conversation coherently

Rules:
- Only include information explicitly stated in the messages.
- Preserve names, numbers, and identifiers verbatim.
- Be concise; the summary replaces the original messages entirely.";

/// Marker inserted between the head and tail of a truncated segment.
const TRUNCATION_MARKER: &str = "\n[truncated]\n";

/// Configuration for segment compression.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Model for summarization calls; `None` uses the request's main model.
    pub model: Option<String>,
    /// Sampling temperature for summarization calls.
    pub temperature: f32,
    /// Characters kept from the start of the segment by the truncation
    /// fallback.
    pub truncation_head_chars: usize,
    /// Characters kept from the end of the segment by the truncation
    /// fallback.
    pub truncation_tail_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.3,
            truncation_head_chars: 600,
            truncation_tail_chars: 600,
        }
    }
}

/// Failure to produce any summary at all. Only possible when both the
/// backend and the truncation fallback come up empty.
#[derive(Debug, Clone, Error)]
#[error("summarization produced no text: {0}")]
pub struct SummarizeError(pub String);

/// Compresses message segments into short summaries.
pub struct Summarizer {
    backend: Arc<dyn CompletionBackend>,
    oracle: Arc<dyn TokenOracle>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        oracle: Arc<dyn TokenOracle>,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            backend,
            oracle,
            config,
        }
    }

    /// Compress `segment` into a summary of at most `max_summary_tokens`,
    /// returning the text and its measured token count.
    pub async fn compress(
        &self,
        segment: &[Message],
        model: &str,
        max_summary_tokens: u32,
    ) -> Result<(String, u32), SummarizeError> {
        let formatted = format_segment(segment);
        let summary_model = self.config.model.as_deref().unwrap_or(model);

        let request = CompletionRequest {
            model: summary_model.to_string(),
            messages: vec![Message::user(formatted.clone())],
            max_tokens: max_summary_tokens.max(1),
            system: Some(COMPRESSION_PROMPT.to_string()),
            temperature: Some(self.config.temperature),
            ..Default::default()
        };

        let text = match self.backend.generate(&request).await {
            Ok(completion) => completion.text,
            Err(err) => {
                warn!(error = %err, "summarization failed, falling back to truncation");
                truncate_segment(
                    &formatted,
                    self.config.truncation_head_chars,
                    self.config.truncation_tail_chars,
                )
            }
        };

        if text.trim().is_empty() {
            return Err(SummarizeError("empty segment".into()));
        }

        let token_count = match self.oracle.count(&text, summary_model).await {
            Ok(n) => n,
            Err(_) => coarse_estimate(&text),
        };

        Ok((text, token_count))
    }
}

/// Render a segment as role-tagged lines for the compression prompt.
fn format_segment(segment: &[Message]) -> String {
    let mut out = String::new();
    for msg in segment {
        out.push('[');
        out.push_str(msg.role.as_str());
        out.push_str("]: ");
        out.push_str(&msg.content);
        out.push_str("\n\n");
    }
    out
}

/// Pure truncation fallback: first `head` and last `tail` characters of the
/// formatted segment with an explicit marker in between. Cuts land on char
/// boundaries so multi-byte text stays valid.
pub fn truncate_segment(text: &str, head: usize, tail: usize) -> String {
    if text.len() <= head + tail {
        return text.to_string();
    }

    let head_end = floor_char_boundary(text, head);
    let tail_start = ceil_char_boundary(text, text.len().saturating_sub(tail));

    let head_part = text.get(..head_end).unwrap_or_default();
    let tail_part = text.get(tail_start..).unwrap_or_default();
    format!("{head_part}{TRUNCATION_MARKER}{tail_part}")
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
