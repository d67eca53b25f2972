//! Read-through / write-through composition of the two cache tiers.
//!
//! Lookup order: local, then shared. A shared hit is copied into the local
//! tier (and its shared TTL refreshed) before being returned. Writes go to
//! the shared tier first, then local. Shared failures degrade the call to
//! local-only operation; the first failure is logged at `warn`, later ones
//! at `debug`, and none of them ever reach the caller.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::local::LocalCache;
use super::shared::{CacheError, SharedCache};
use super::CacheEntry;

/// Which tier satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Local,
    Shared,
}

/// Two-tier summary cache. Either tier may be absent (disabled by
/// configuration); with both absent every lookup is a miss and every write a
/// no-op, which the engine treats as "always recompute".
pub struct TieredCache {
    local: Option<Mutex<LocalCache>>,
    shared: Option<Arc<dyn SharedCache>>,
    shared_warned: AtomicBool,
}

impl TieredCache {
    pub fn new(local: Option<LocalCache>, shared: Option<Arc<dyn SharedCache>>) -> Self {
        Self {
            local: local.map(Mutex::new),
            shared,
            shared_warned: AtomicBool::new(false),
        }
    }

    /// Look up a fingerprint in both tiers.
    pub async fn get(&self, key: &str) -> Option<(CacheEntry, CacheTier)> {
        if let Some(local) = &self.local
            && let Some(entry) = local.lock().unwrap_or_else(|e| e.into_inner()).get(key)
        {
            return Some((entry, CacheTier::Local));
        }

        let shared = self.shared.as_ref()?;
        match shared.get(key).await {
            Ok(Some(entry)) => {
                if entry.is_expired() {
                    return None;
                }
                // Read-through: populate the local tier and slide the shared
                // TTL so hot entries stay warm across the fleet.
                if let Some(local) = &self.local {
                    local
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .put(key, entry.clone());
                }
                if let Err(err) = shared.expire(key, entry.remaining_ttl()).await {
                    self.note_shared_failure("expire", &err);
                }
                Some((entry, CacheTier::Shared))
            }
            Ok(None) => None,
            Err(err) => {
                self.note_shared_failure("get", &err);
                None
            }
        }
    }

    /// Write a fully formed entry to both tiers (shared first).
    pub async fn put(&self, key: &str, entry: &CacheEntry) {
        if let Some(shared) = &self.shared
            && let Err(err) = shared.set(key, entry, entry.remaining_ttl()).await
        {
            self.note_shared_failure("set", &err);
        }

        if let Some(local) = &self.local {
            local
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .put(key, entry.clone());
        }
    }

    /// Whether a shared tier is configured at all.
    pub fn has_shared(&self) -> bool {
        self.shared.is_some()
    }

    fn note_shared_failure(&self, op: &str, err: &CacheError) {
        if !self.shared_warned.swap(true, Ordering::Relaxed) {
            warn!(op, error = %err, "shared cache unavailable, degrading to local-only");
        } else {
            debug!(op, error = %err, "shared cache still unavailable");
        }
    }
}
