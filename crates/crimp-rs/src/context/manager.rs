//! Orchestration of the full optimization pass.
//!
//! [`ContextManager`] composes the planner, fingerprinter, two-tier cache,
//! singleflight coordinator, and summarizer into one operation:
//! [`optimize_context`](ContextManager::optimize_context). The pass moves
//! through a small state machine:
//!
//! - under budget: planning short-circuits straight to done (no-op);
//! - over budget: plan, then a singleflight-guarded cache lookup, then (on
//!   miss) summary computation and write-through, then combining: the
//!   summary message followed by the kept verbatim suffix, re-validated
//!   against the budget with bounded shrinking;
//! - degraded fallback: if no summary can be produced at all, the original
//!   history is returned unchanged with `degraded = true` rather than
//!   failing the caller.
//!
//! All collaborators are injected at construction; the only hard error the
//! manager ever returns is [`ApiError::BadRequest`] for malformed input.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, LocalCache, SharedCache, TieredCache};
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::upstream::CompletionBackend;
use crate::{Message, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

use super::fingerprint::Fingerprint;
use super::planner::{BudgetPlanner, DEFAULT_RESERVE_FRACTION};
use super::singleflight::{FlightError, Singleflight};
use super::summarizer::{truncate_segment, Summarizer, SummarizerConfig};
use super::tokenizer::{coarse_estimate, TokenOracle};

/// Prefix line of the injected summary message.
const SUMMARY_HEADER: &str = "Summary of the earlier conversation:";

/// Bounded number of shrink iterations during re-validation.
const MAX_SHRINK_ROUNDS: u32 = 4;

/// Don't clip the summary below this size; past that point the result is
/// reported as degraded instead.
const MIN_SUMMARY_CHARS: usize = 64;

// ── Configuration ──────────────────────────────────────────────────

/// Explicit configuration for the context manager. Every recognized option
/// and its default, no dynamic options bag.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Default model for completion and summarization. Default:
    /// [`DEFAULT_MODEL`].
    pub model: String,
    /// Default token budget for the optimized sequence. Default:
    /// [`DEFAULT_MAX_TOKENS`].
    pub max_tokens: u32,
    /// Fraction of the budget reserved for the summary placeholder when
    /// compression is needed. Default: 0.2.
    pub reserve_fraction: f64,
    /// Whether the process-local cache tier is enabled. Default: true.
    pub use_local_cache: bool,
    /// Whether the shared cache tier is enabled (requires a [`SharedCache`]
    /// collaborator at construction). Default: true.
    pub use_shared_cache: bool,
    /// Capacity of the local cache tier. Default: 256 entries.
    pub local_cache_entries: usize,
    /// TTL applied to newly created summaries in both tiers. Default: 1 hour.
    pub summary_ttl: Duration,
    /// Summarization settings (model override, temperature, truncation
    /// fallback sizes).
    pub summarizer: SummarizerConfig,
}

impl ContextConfig {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            ..Default::default()
        }
    }

    /// Override the summary reserve fraction.
    pub fn with_reserve_fraction(mut self, fraction: f64) -> Self {
        self.reserve_fraction = fraction;
        self
    }

    /// Enable or disable the local cache tier.
    pub fn with_local_cache(mut self, enabled: bool) -> Self {
        self.use_local_cache = enabled;
        self
    }

    /// Enable or disable the shared cache tier.
    pub fn with_shared_cache(mut self, enabled: bool) -> Self {
        self.use_shared_cache = enabled;
        self
    }

    /// Override the summary TTL.
    pub fn with_summary_ttl(mut self, ttl: Duration) -> Self {
        self.summary_ttl = ttl;
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            reserve_fraction: DEFAULT_RESERVE_FRACTION,
            use_local_cache: true,
            use_shared_cache: true,
            local_cache_entries: 256,
            summary_ttl: Duration::from_secs(3600),
            summarizer: SummarizerConfig::default(),
        }
    }
}

// ── Result ─────────────────────────────────────────────────────────

/// Outcome of one optimization pass.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// The optimized sequence: at most one summary message followed by the
    /// retained original messages in their original relative order.
    pub messages: Vec<Message>,
    pub original_count: usize,
    pub optimized_count: usize,
    /// `None` when no compression was needed, otherwise whether the summary
    /// came from cache (or a shared in-process flight) instead of a fresh
    /// computation.
    pub cache_hit: Option<bool>,
    /// Best-effort marker: the result may exceed the budget or bypass
    /// summarization entirely.
    pub degraded: bool,
}

/// Value shared through the singleflight coordinator.
#[derive(Debug, Clone)]
struct Lookup {
    entry: CacheEntry,
    from_cache: bool,
}

// ── Manager ────────────────────────────────────────────────────────

/// The context optimization engine. One long-lived instance serves all
/// requests; per-request model/budget overrides go through
/// [`optimize_with`](Self::optimize_with).
pub struct ContextManager {
    config: ContextConfig,
    planner: BudgetPlanner,
    oracle: Arc<dyn TokenOracle>,
    summarizer: Summarizer,
    cache: TieredCache,
    flights: Singleflight<Lookup>,
    metrics: Arc<Metrics>,
}

impl ContextManager {
    /// Build a manager from its collaborators. `shared_cache` is only used
    /// when `config.use_shared_cache` is set.
    pub fn new(
        config: ContextConfig,
        oracle: Arc<dyn TokenOracle>,
        backend: Arc<dyn CompletionBackend>,
        shared_cache: Option<Arc<dyn SharedCache>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let local = config
            .use_local_cache
            .then(|| LocalCache::new(config.local_cache_entries));
        let shared = if config.use_shared_cache {
            shared_cache
        } else {
            None
        };
        let summarizer = Summarizer::new(backend, oracle.clone(), config.summarizer.clone());

        Self {
            planner: BudgetPlanner::new(config.reserve_fraction),
            cache: TieredCache::new(local, shared),
            flights: Singleflight::new(),
            oracle,
            summarizer,
            config,
            metrics,
        }
    }

    /// Optimize `messages` under the configured model and budget.
    pub async fn optimize_context(
        &self,
        messages: &[Message],
        conversation_id: &str,
    ) -> Result<OptimizationResult, ApiError> {
        self.optimize_with(
            messages,
            conversation_id,
            &self.config.model,
            self.config.max_tokens,
        )
        .await
    }

    /// Optimize `messages` under a per-request model and budget. The cache
    /// key incorporates both, so different budgets never share summaries.
    pub async fn optimize_with(
        &self,
        messages: &[Message],
        conversation_id: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<OptimizationResult, ApiError> {
        validate_messages(messages)?;

        let plan = self
            .planner
            .plan(messages, model, max_tokens, self.oracle.as_ref())
            .await;

        if !plan.needs_compression() {
            debug!(
                conversation_id,
                total_tokens = plan.total_tokens,
                "history fits the budget, no optimization needed"
            );
            return Ok(OptimizationResult {
                messages: messages.to_vec(),
                original_count: messages.len(),
                optimized_count: messages.len(),
                cache_hit: None,
                degraded: plan.over_budget,
            });
        }

        let segment = &messages[..plan.keep_from];
        let fingerprint = Fingerprint::compute(
            segment,
            model,
            max_tokens,
            self.planner.reserve_fraction(),
        );
        debug!(
            conversation_id,
            fingerprint = %fingerprint,
            compress = segment.len(),
            keep = messages.len() - plan.keep_from,
            "compressing conversation prefix"
        );

        let summary_budget = plan.reserved_tokens.max(1);
        let lookup = match self
            .lookup_or_compute(&fingerprint, segment, model, summary_budget)
            .await
        {
            Ok(lookup) => lookup,
            Err(err) => {
                // Degraded fallback: no summary could be produced at all.
                // Hand back the unmodified history rather than failing.
                warn!(conversation_id, error = %err, "optimization degraded, returning original history");
                return Ok(OptimizationResult {
                    messages: messages.to_vec(),
                    original_count: messages.len(),
                    optimized_count: messages.len(),
                    cache_hit: None,
                    degraded: true,
                });
            }
        };

        self.metrics.record_optimized_context();
        if lookup.from_cache {
            self.metrics.record_cached_summary();
        } else {
            self.metrics.record_new_summary();
        }

        self.combine(messages, plan.keep_from, plan.over_budget, lookup, model, max_tokens)
            .await
    }

    /// Singleflight-guarded lookup: local tier, then shared, then compute
    /// and write through both. One abandoned flight is retried once; by then
    /// the entry is usually cached or this caller becomes the leader.
    async fn lookup_or_compute(
        &self,
        fingerprint: &Fingerprint,
        segment: &[Message],
        model: &str,
        summary_budget: u32,
    ) -> Result<Lookup, FlightError> {
        let key = fingerprint.as_str();
        let mut attempts = 0;
        loop {
            let outcome = self
                .flights
                .run(key, || async {
                    if let Some((entry, tier)) = self.cache.get(key).await {
                        debug!(fingerprint = key, ?tier, "summary cache hit");
                        return Ok(Lookup {
                            entry,
                            from_cache: true,
                        });
                    }

                    let (summary_text, token_count) = self
                        .summarizer
                        .compress(segment, model, summary_budget)
                        .await
                        .map_err(|e| e.to_string())?;

                    let entry = CacheEntry {
                        fingerprint: key.to_string(),
                        summary_text,
                        token_count,
                        created_at: Utc::now(),
                        ttl_secs: self.config.summary_ttl.as_secs(),
                    };
                    self.cache.put(key, &entry).await;
                    Ok(Lookup {
                        entry,
                        from_cache: false,
                    })
                })
                .await;

            match outcome {
                Ok((mut lookup, led)) => {
                    // Joining another caller's flight counts as a hit: the
                    // summarizer ran at most once for this fingerprint.
                    if !led {
                        lookup.from_cache = true;
                    }
                    return Ok(lookup);
                }
                Err(FlightError::Abandoned) if attempts == 0 => {
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Assemble summary + kept suffix and re-validate against the budget,
    /// shrinking within bounds when the combination still does not fit.
    async fn combine(
        &self,
        messages: &[Message],
        keep_from: usize,
        over_budget: bool,
        lookup: Lookup,
        model: &str,
        max_tokens: u32,
    ) -> Result<OptimizationResult, ApiError> {
        let mut degraded = over_budget;
        let mut summary_text = lookup.entry.summary_text;
        let mut kept: Vec<Message> = messages[keep_from..].to_vec();
        let mut kept_counts = Vec::with_capacity(kept.len());
        for msg in &kept {
            kept_counts.push(self.count_with_fallback(&msg.content, model).await);
        }

        let mut rounds = 0;
        loop {
            let summary_tokens = self
                .count_with_fallback(&render_summary(&summary_text), model)
                .await;
            let total: u32 = summary_tokens + kept_counts.iter().sum::<u32>();
            if total <= max_tokens {
                break;
            }
            if rounds >= MAX_SHRINK_ROUNDS {
                degraded = true;
                break;
            }
            rounds += 1;

            if kept.len() > 1 {
                // Drop the oldest kept message first; recency is worth more
                // than breadth.
                kept.remove(0);
                kept_counts.remove(0);
            } else if summary_text.len() > MIN_SUMMARY_CHARS {
                let half = summary_text.len() / 4;
                summary_text = truncate_segment(&summary_text, half, half);
            } else {
                degraded = true;
                break;
            }
        }

        let mut optimized = Vec::with_capacity(kept.len() + 1);
        optimized.push(Message::system(render_summary(&summary_text)));
        optimized.extend(kept);

        Ok(OptimizationResult {
            original_count: messages.len(),
            optimized_count: optimized.len(),
            messages: optimized,
            cache_hit: Some(lookup.from_cache),
            degraded,
        })
    }

    async fn count_with_fallback(&self, text: &str, model: &str) -> u32 {
        match self.oracle.count(text, model).await {
            Ok(n) => n,
            Err(_) => coarse_estimate(text),
        }
    }
}

fn render_summary(text: &str) -> String {
    format!("{SUMMARY_HEADER}\n{text}")
}

/// Malformed input is the engine's only hard error.
fn validate_messages(messages: &[Message]) -> Result<(), ApiError> {
    if messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".into()));
    }
    if let Some(idx) = messages.iter().position(|m| m.content.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "message {idx} has empty content"
        )));
    }
    Ok(())
}
