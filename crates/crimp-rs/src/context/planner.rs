//! Budget planning: deciding the keep/compress split.
//!
//! The planner walks the conversation from the most recent message backward,
//! accumulating token counts, and stops as soon as adding the next (older)
//! message would exceed the budget minus the summary reserve. Everything
//! older than the stopping point becomes the to-compress segment.
//!
//! The reserve is a configured fraction of the budget (default 0.2) and is
//! only applied when the verbatim history does not fit: under-budget
//! conversations are a no-op and keep every token for themselves.

use tracing::warn;

use crate::Message;

use super::tokenizer::{coarse_estimate, TokenOracle};

/// Default fraction of the budget reserved for the summary placeholder.
pub const DEFAULT_RESERVE_FRACTION: f64 = 0.2;

/// Result of a planning pass over one conversation.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// Index of the first kept message: `[..keep_from]` is the to-compress
    /// segment, `[keep_from..]` is kept verbatim. Zero means no compression.
    pub keep_from: usize,
    /// Token count of the full conversation.
    pub total_tokens: u32,
    /// Token count of the kept suffix.
    pub kept_tokens: u32,
    /// Tokens reserved for the summary placeholder (zero when no
    /// compression is needed).
    pub reserved_tokens: u32,
    /// Set when even the single most recent message exceeds the budget on
    /// its own; the caller degrades gracefully instead of erroring.
    pub over_budget: bool,
}

impl SplitPlan {
    /// Whether any messages need to be compressed.
    pub fn needs_compression(&self) -> bool {
        self.keep_from > 0
    }
}

/// Computes keep/compress splits for a fixed budget policy.
#[derive(Debug, Clone)]
pub struct BudgetPlanner {
    reserve_fraction: f64,
}

impl BudgetPlanner {
    pub fn new(reserve_fraction: f64) -> Self {
        Self {
            reserve_fraction: reserve_fraction.clamp(0.0, 0.9),
        }
    }

    pub fn reserve_fraction(&self) -> f64 {
        self.reserve_fraction
    }

    /// Count every message and decide the split for `max_tokens`.
    ///
    /// Oracle failures switch the rest of the pass to the coarse estimate;
    /// planning itself never fails.
    pub async fn plan(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        oracle: &dyn TokenOracle,
    ) -> SplitPlan {
        let counts = self.count_all(messages, model, oracle).await;
        let total_tokens: u32 = counts.iter().sum();

        if total_tokens <= max_tokens {
            return SplitPlan {
                keep_from: 0,
                total_tokens,
                kept_tokens: total_tokens,
                reserved_tokens: 0,
                over_budget: false,
            };
        }

        let reserved_tokens = (f64::from(max_tokens) * self.reserve_fraction) as u32;
        let keep_budget = max_tokens.saturating_sub(reserved_tokens);

        // Scan newest-to-oldest, keeping messages while they fit.
        let mut kept_tokens: u32 = 0;
        let mut kept = 0usize;
        for count in counts.iter().rev() {
            if kept_tokens + count > keep_budget {
                break;
            }
            kept_tokens += count;
            kept += 1;
        }

        // The most recent message is always kept, even when it alone blows
        // the budget; that case is flagged rather than failed.
        let over_budget = kept == 0;
        if over_budget {
            kept = 1;
            kept_tokens = counts.last().copied().unwrap_or(0);
        }

        SplitPlan {
            keep_from: messages.len() - kept,
            total_tokens,
            kept_tokens,
            reserved_tokens,
            over_budget,
        }
    }

    async fn count_all(
        &self,
        messages: &[Message],
        model: &str,
        oracle: &dyn TokenOracle,
    ) -> Vec<u32> {
        let mut counts = Vec::with_capacity(messages.len());
        let mut oracle_down = false;
        for msg in messages {
            let count = if oracle_down {
                coarse_estimate(&msg.content)
            } else {
                match oracle.count(&msg.content, model).await {
                    Ok(n) => n,
                    Err(err) => {
                        warn!(error = %err, "token oracle failed, using coarse estimates");
                        oracle_down = true;
                        coarse_estimate(&msg.content)
                    }
                }
            };
            counts.push(count);
        }
        counts
    }
}

impl Default for BudgetPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVE_FRACTION)
    }
}
