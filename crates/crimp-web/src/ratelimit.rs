//! Per-client sliding-window rate limiting.
//!
//! Each client gets a deque of request timestamps; a request is admitted when
//! fewer than `max_requests` timestamps fall inside the window. The limiter
//! fails open: a poisoned lock degrades to whatever state the map was in
//! rather than rejecting traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per client per window. Default: 60.
    pub max_requests: u32,
    /// Window length. Default: one minute.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of one admission check, with the values the standard
/// `X-RateLimit-*` response headers need.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the oldest in-window request ages out.
    pub reset_secs: u64,
}

/// Sliding-window limiter keyed by client identifier.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Check (and, when admitted, record) one request for `client_id`.
    pub fn check(&self, client_id: &str) -> Decision {
        let now = Instant::now();
        let limit = self.config.max_requests;
        let window = self.config.window;

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let stamps = clients.entry(client_id.to_string()).or_default();
        while let Some(front) = stamps.front()
            && now.duration_since(*front) >= window
        {
            stamps.pop_front();
        }

        let used = stamps.len() as u32;
        if used >= limit {
            let reset_secs = stamps
                .front()
                .map(|f| window.saturating_sub(now.duration_since(*f)).as_secs() + 1)
                .unwrap_or(0);
            return Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs,
            };
        }

        stamps.push_back(now);
        Decision {
            allowed: true,
            limit,
            remaining: limit - used - 1,
            reset_secs: window.as_secs(),
        }
    }

    /// Drop clients whose whole window has aged out. Called opportunistically
    /// so the map does not grow with one-off clients forever.
    pub fn purge_idle(&self) {
        let now = Instant::now();
        let window = self.config.window;
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|last| now.duration_since(*last) < window)
        });
    }
}
