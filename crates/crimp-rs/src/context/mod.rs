//! Context optimization: budgeting, fingerprinting, deduplication,
//! summarization, and orchestration.
//!
//! The flow for a single over-budget conversation:
//!
//! 1. **[`planner`]** — decide the keep/compress split: the most recent
//!    messages that fit under the budget (minus a summary reserve) are kept
//!    verbatim, everything older becomes the to-compress segment.
//! 2. **[`fingerprint`]** — derive a deterministic cache key from the
//!    segment, model, and budget parameters.
//! 3. **[`singleflight`]** — collapse concurrent lookups for the same
//!    fingerprint into one computation per process.
//! 4. **[`summarizer`]** — compress the segment through the downstream
//!    completion service, falling back to truncation when it fails.
//! 5. **[`manager`]** — the [`ContextManager`](manager::ContextManager)
//!    orchestrator: combines the summary with the kept suffix, re-validates
//!    against the budget, and reports optimization metadata.
//!
//! Token counts come from the [`tokenizer`] oracle throughout; every oracle
//! failure falls back to a coarse length-based estimate rather than failing
//! the request.

pub mod fingerprint;
pub mod manager;
pub mod planner;
pub mod singleflight;
pub mod summarizer;
pub mod tokenizer;

pub use fingerprint::Fingerprint;
pub use manager::{ContextConfig, ContextManager, OptimizationResult};
pub use planner::{BudgetPlanner, SplitPlan};
pub use singleflight::Singleflight;
pub use summarizer::{Summarizer, SummarizerConfig};
pub use tokenizer::{HeuristicOracle, OracleError, TokenOracle, DEFAULT_CHARS_PER_TOKEN};
