//! Process-local summary cache.
//!
//! Bounded map with TTL expiry and least-recently-used eviction at capacity.
//! Hit/miss counters are kept for diagnostics. Callers wrap this in a mutex;
//! every operation is a short, non-blocking map manipulation.

use std::collections::HashMap;
use std::time::Instant;

use super::CacheEntry;

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
    /// Logical clock value of the last access, for LRU ordering.
    last_used: u64,
}

/// Bounded key-to-summary store. Fastest tier of the cache; entries here are
/// read-through copies of the shared tier.
#[derive(Debug)]
pub struct LocalCache {
    slots: HashMap<String, Slot>,
    max_entries: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl LocalCache {
    /// Create a cache holding at most `max_entries` summaries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            slots: HashMap::new(),
            max_entries: max_entries.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up an entry. Expired entries are removed and reported as misses.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        self.clock += 1;
        let now = Instant::now();

        match self.slots.get_mut(key) {
            Some(slot) if slot.expires_at > now => {
                slot.last_used = self.clock;
                self.hits += 1;
                Some(slot.entry.clone())
            }
            Some(_) => {
                self.slots.remove(key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert an entry under its remaining TTL, evicting the least recently
    /// used slot if the cache is full.
    pub fn put(&mut self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        let ttl = entry.remaining_ttl();
        if ttl.is_zero() {
            return;
        }

        if !self.slots.contains_key(&key) && self.slots.len() >= self.max_entries {
            self.evict_lru();
        }

        self.clock += 1;
        self.slots.insert(
            key,
            Slot {
                entry,
                expires_at: Instant::now() + ttl,
                last_used: self.clock,
            },
        );
    }

    /// Drop every expired entry.
    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| slot.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn evict_lru(&mut self) {
        if let Some(lru_key) = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(k, _)| k.clone())
        {
            self.slots.remove(&lru_key);
        }
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(fp: &str, ttl_secs: u64) -> CacheEntry {
        CacheEntry {
            fingerprint: fp.into(),
            summary_text: format!("summary for {fp}"),
            token_count: 10,
            created_at: Utc::now(),
            ttl_secs,
        }
    }

    #[test]
    fn put_and_get() {
        let mut cache = LocalCache::new(8);
        cache.put("a", entry("a", 60));

        let hit = cache.get("a").unwrap();
        assert_eq!(hit.summary_text, "summary for a");
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn miss_is_counted() {
        let mut cache = LocalCache::new(8);
        assert!(cache.get("nothing").is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn expired_entries_are_not_served() {
        let mut cache = LocalCache::new(8);
        cache.put("a", entry("a", 0));
        // Zero remaining TTL means the put is skipped entirely.
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let mut cache = LocalCache::new(2);
        cache.put("a", entry("a", 60));
        cache.put("b", entry("b", 60));
        cache.get("a"); // Touch "a" so "b" becomes least recently used.
        cache.put("c", entry("c", 60));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let mut cache = LocalCache::new(2);
        cache.put("a", entry("a", 60));
        cache.put("b", entry("b", 60));
        cache.put("a", entry("a", 60));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn hit_rate_computation() {
        let mut cache = LocalCache::new(8);
        cache.put("a", entry("a", 60));
        cache.get("a"); // hit
        cache.get("b"); // miss
        assert!((cache.hit_rate() - 0.5).abs() < 0.01);
    }
}
