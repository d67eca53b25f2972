//! Convenience re-exports for common `crimp-rs` types.
//!
//! Meant to be glob-imported when embedding the engine:
//!
//! ```ignore
//! use crimp_rs::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of embedders: the
//! [`ContextManager`] + config, [`Message`] constructors, the completion
//! client, and the collaborator traits. Specialized types (cache tiers,
//! planner internals, singleflight) are intentionally excluded — import
//! those from their modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    generate_conversation_id, Message, MessageRole, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::context::{ContextConfig, ContextManager, OptimizationResult};
pub use crate::context::tokenizer::{HeuristicOracle, TokenOracle};

// ── Upstream ────────────────────────────────────────────────────────
pub use crate::upstream::{
    Completion, CompletionBackend, CompletionClient, CompletionRequest, RetryConfig,
};

// ── Caching and observability ───────────────────────────────────────
pub use crate::cache::{CacheEntry, HttpSharedCache, SharedCache};
pub use crate::error::ApiError;
pub use crate::metrics::{Metrics, MetricsSnapshot};
