//! Two-tier summary cache: a fast in-process tier backed by a shared,
//! cross-process tier.
//!
//! 1. **[`local`]** — bounded, TTL-aware, LRU-evicting map. Lowest latency;
//!    its only failure mode is eviction. Entries here are read-through
//!    copies of shared entries, never an independent source of truth.
//!
//! 2. **[`shared`]** — the [`SharedCache`](shared::SharedCache) trait and an
//!    HTTP-backed implementation. Authoritative across processes,
//!    best-effort: any error degrades the call to local-only operation.
//!
//! 3. **[`tiered`]** — composes the two with read-through / write-through
//!    semantics and warn-once degradation logging.

pub mod local;
pub mod shared;
pub mod tiered;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use local::LocalCache;
pub use shared::{CacheError, HttpSharedCache, SharedCache};
pub use tiered::{CacheTier, TieredCache};

/// A cached summary. Fully formed before it is ever written to a tier, so a
/// partially constructed entry can never be observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint this entry was computed for (also the cache key).
    pub fingerprint: String,
    /// The condensed summary text.
    pub summary_text: String,
    /// Token count of `summary_text`, as measured at creation time.
    pub token_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds, shared by both tiers.
    pub ttl_secs: u64,
}

impl CacheEntry {
    /// Age of the entry relative to `created_at`.
    pub fn age(&self) -> Duration {
        let secs = (Utc::now() - self.created_at).num_seconds().max(0) as u64;
        Duration::from_secs(secs)
    }

    /// Whether the entry has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        self.age() >= Duration::from_secs(self.ttl_secs)
    }

    /// TTL remaining before expiry, saturating at zero.
    pub fn remaining_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs).saturating_sub(self.age())
    }
}
