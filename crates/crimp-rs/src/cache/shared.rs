//! Shared (cross-process) summary cache.
//!
//! The shared tier is authoritative but best-effort: many relay processes
//! read and write it with no cross-process locking. Benign write races are
//! accepted because entries for the same fingerprint are content-equivalent.
//! Every failure surfaces as a [`CacheError`]; the tiered composition turns
//! that into local-only degradation, never into a caller-visible error.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use super::CacheEntry;

/// Failure talking to the shared cache store.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("shared cache request failed: {0}")]
    Transport(String),
    #[error("shared cache returned HTTP {0}")]
    Http(u16),
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

/// Cross-process key-to-summary store reachable over the network.
///
/// Implementations must treat `set` as atomic at entry granularity: the
/// caller always passes a fully formed [`CacheEntry`], and a reader must
/// never observe a partial one.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Fetch an entry, `Ok(None)` on miss.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry under the given TTL.
    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError>;

    /// Refresh the TTL of an existing entry.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Liveness probe, used by the boundary layer's health endpoint.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// [`SharedCache`] implementation against a remote HTTP key-value service.
///
/// Wire format: JSON-encoded [`CacheEntry`] values under
/// `{base_url}/v1/kv/{key}`, with the TTL carried as a query parameter.
pub struct HttpSharedCache {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSharedCache {
    /// Create a client for the KV service at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CacheError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{key}", self.base_url)
    }
}

#[async_trait]
impl SharedCache for HttpSharedCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let resp = self
            .client
            .get(self.key_url(key))
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        match resp.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let entry: CacheEntry = resp
                    .json()
                    .await
                    .map_err(|e| CacheError::Malformed(e.to_string()))?;
                trace!(key, "shared cache hit");
                Ok(Some(entry))
            }
            s => Err(CacheError::Http(s)),
        }
    }

    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let resp = self
            .client
            .put(self.key_url(key))
            .query(&[("ttl", ttl.as_secs())])
            .json(entry)
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CacheError::Http(resp.status().as_u16()))
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let resp = self
            .client
            .post(format!("{}/expire", self.key_url(key)))
            .query(&[("ttl", ttl.as_secs())])
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CacheError::Http(resp.status().as_u16()))
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CacheError::Http(resp.status().as_u16()))
        }
    }
}
