//! Context-optimizing relay engine for hosted completion APIs.
//!
//! `crimp-rs` sits in front of a hosted conversational completion service and
//! keeps each request's message history within a fixed token budget before
//! forwarding it. The core abstraction is the
//! [`ContextManager`](context::manager::ContextManager): given an arbitrarily
//! long conversation and a budget, it decides which suffix to keep verbatim
//! and replaces the older prefix with a condensed summary, reusing identical
//! summaries across requests and across process instances through a two-tier
//! cache.
//!
//! # Getting started
//!
//! ```ignore
//! use crimp_rs::prelude::*;
//! use std::sync::Arc;
//!
//! let oracle: Arc<dyn TokenOracle> = Arc::new(HeuristicOracle::default());
//! let backend: Arc<dyn CompletionBackend> =
//!     Arc::new(CompletionClient::new("https://api.example.com", api_key)?);
//! let metrics = Arc::new(Metrics::new());
//!
//! let config = ContextConfig::new("claude-sonnet-4", 4096);
//! let manager = ContextManager::new(config, oracle, backend.clone(), None, metrics);
//!
//! let result = manager.optimize_context(&messages, "conv_123").await?;
//! println!(
//!     "kept {} of {} messages (cache hit: {:?})",
//!     result.optimized_count, result.original_count, result.cache_hit,
//! );
//! ```
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Optimize a conversation:** see
//!   [`ContextManager`](context::manager::ContextManager) and
//!   [`ContextConfig`](context::manager::ContextConfig). All collaborators
//!   (token oracle, completion backend, shared cache, metrics) are injected
//!   at construction, so tests can substitute fakes for any of them.
//!
//! - **Count tokens:** see the [`TokenOracle`](context::tokenizer::TokenOracle)
//!   trait and [`HeuristicOracle`](context::tokenizer::HeuristicOracle), the
//!   default chars-per-token estimator.
//!
//! - **Cache summaries across processes:** implement
//!   [`SharedCache`](cache::shared::SharedCache), or use
//!   [`HttpSharedCache`](cache::shared::HttpSharedCache) against a remote KV
//!   service. The [`TieredCache`](cache::tiered::TieredCache) composes it
//!   with the process-local [`LocalCache`](cache::local::LocalCache) using
//!   read-through / write-through semantics.
//!
//! - **Call the downstream completion service:** see
//!   [`CompletionClient`](upstream::CompletionClient) and the
//!   [`CompletionBackend`](upstream::CompletionBackend) trait. Transient
//!   failures retry with exponential backoff ([`upstream::retry`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Budget planning, fingerprinting, singleflight, summarization, orchestration |
//! | [`cache`] | Local (in-process) and shared (cross-process) summary tiers |
//! | [`upstream`] | Wire types and HTTP client for the downstream completion API |
//! | [`error`] | Closed [`ApiError`](error::ApiError) taxonomy for the boundary layer |
//! | [`metrics`] | Injectable atomic counters with snapshot / reset lifecycle |
//!
//! # Design principles
//!
//! 1. **Fail open.** Optimization is best-effort, never contractual. A broken
//!    shared cache, tokenizer, or summarizer degrades the result; it does not
//!    fail the request. Only malformed input is a hard error.
//!
//! 2. **Determinism buys reuse.** Summary cache keys are pure functions of
//!    the compressed segment, model, and budget parameters, so identical work
//!    is shared across requests and across processes.
//!
//! 3. **Duplicate work is bounded, not forbidden.** Within a process the
//!    singleflight coordinator allows one computation per fingerprint; across
//!    processes last-writer-wins is acceptable because identical inputs yield
//!    content-equivalent summaries.

pub mod cache;
pub mod context;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod upstream;

use serde::{Deserialize, Serialize};

// Re-export the most commonly used items at the crate root.
pub use cache::CacheEntry;
pub use context::manager::{ContextConfig, ContextManager, OptimizationResult};
pub use error::ApiError;
pub use metrics::Metrics;
pub use upstream::{CompletionBackend, CompletionClient, CompletionRequest};

// ── Constants ──────────────────────────────────────────────────────

/// Default model for completion and summarization calls.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4";

/// Default token budget for an optimized message sequence.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Stable wire representation, also used for fingerprint canonicalization.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message. Content is opaque text; token counts are
/// computed on demand through the [`TokenOracle`](context::tokenizer::TokenOracle)
/// and never stored alongside the message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Generate a fresh conversation identifier for requests that did not
/// supply one.
pub fn generate_conversation_id() -> String {
    format!("conv_{}", uuid::Uuid::new_v4())
}
