//! Per-process deduplication of in-flight summary computations.
//!
//! For a given key, the first caller becomes the leader and runs the
//! computation; callers arriving while it is in flight subscribe to the
//! leader's broadcast channel and await the shared outcome. Exactly one
//! computation runs per key per "not yet cached" window, and every waiter
//! observes the same result, success or failure.
//!
//! Scope is one process only. Two processes can still compute the same
//! summary concurrently; that duplicate work is bounded and harmless because
//! identical inputs produce content-equivalent cache writes.
//!
//! Cancellation safety: if the leader's future is dropped mid-computation,
//! a drop guard removes the in-flight entry and notifies waiters with
//! [`FlightError::Abandoned`] so they can retry (typically finding the entry
//! in cache, or becoming the new leader).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::broadcast;

/// Shared failure outcome of a flight.
#[derive(Debug, Clone, Error)]
pub enum FlightError {
    #[error("computation failed: {0}")]
    Failed(String),
    #[error("in-flight computation was abandoned before completing")]
    Abandoned,
}

type FlightResult<T> = Result<T, FlightError>;

/// Singleflight coordinator, generic over the (cloneable) computed value.
pub struct Singleflight<T: Clone> {
    inflight: Mutex<HashMap<String, broadcast::Sender<FlightResult<T>>>>,
}

impl<T: Clone + Send + 'static> Singleflight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `compute` for `key`, or await a computation already in flight.
    ///
    /// Returns the value plus `true` when this caller led the computation,
    /// `false` when it joined an existing flight.
    pub async fn run<F, Fut>(&self, key: &str, compute: F) -> FlightResult<(T, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        // Either join an existing flight or register as the leader. The map
        // lock's scope ends before any await so the returned future stays
        // `Send`.
        let role = {
            let mut map = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match map.get(key) {
                Some(tx) => Role::Join(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    map.insert(key.to_string(), tx.clone());
                    Role::Lead(tx)
                }
            }
        };

        let tx = match role {
            Role::Join(mut rx) => {
                return match rx.recv().await {
                    Ok(result) => result.map(|value| (value, false)),
                    // The leader vanished without sending; treat as abandoned.
                    Err(_) => Err(FlightError::Abandoned),
                };
            }
            Role::Lead(tx) => tx,
        };

        let mut guard = FlightGuard {
            inflight: &self.inflight,
            key,
            completed: false,
        };

        let result = compute().await.map_err(FlightError::Failed);

        // Deregister before broadcasting: late arrivals that miss the entry
        // re-check the cache instead of waiting on a closed channel.
        guard.completed = true;
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        let _ = tx.send(result.clone());

        result.map(|value| (value, true))
    }

    /// Number of computations currently in flight (diagnostics).
    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl<T: Clone + Send + 'static> Default for Singleflight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a caller resolved to while holding the map lock: join an existing
/// flight or lead a new one.
enum Role<T> {
    Join(broadcast::Receiver<FlightResult<T>>),
    Lead(broadcast::Sender<FlightResult<T>>),
}

/// Cleans up the in-flight registration if the leader is cancelled.
struct FlightGuard<'a, T: Clone> {
    inflight: &'a Mutex<HashMap<String, broadcast::Sender<FlightResult<T>>>>,
    key: &'a str,
    completed: bool,
}

impl<T: Clone> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut map = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = map.remove(self.key) {
            let _ = tx.send(Err(FlightError::Abandoned));
        }
    }
}
