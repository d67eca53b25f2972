//! HTTP boundary layer for `crimp-rs` context-optimized completions.
//!
//! `crimp-web` wraps the engine in an axum server exposing a messages-style
//! relay endpoint plus observability routes. Clients talk to the relay
//! exactly as they would talk to the hosted completion API; the relay keeps
//! each conversation inside the token budget before forwarding it.
//!
//! # Quick start
//!
//! ```ignore
//! use crimp_web::{AppState, RelayConfig, spawn_relay};
//! use crimp_rs::prelude::*;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(Metrics::new());
//! let oracle: Arc<dyn TokenOracle> = Arc::new(HeuristicOracle::default());
//! let backend: Arc<dyn CompletionBackend> =
//!     Arc::new(CompletionClient::new("https://api.example.com", api_key)?);
//! let manager = Arc::new(ContextManager::new(
//!     ContextConfig::new("claude-sonnet-4", 4096),
//!     oracle.clone(),
//!     backend.clone(),
//!     None,
//!     metrics.clone(),
//! ));
//!
//! let state = AppState {
//!     manager, backend, oracle, metrics,
//!     shared_cache: None,
//!     limiter: None,
//!     default_model: "claude-sonnet-4".into(),
//!     default_max_tokens: 4096,
//! };
//! let addr = spawn_relay(state, RelayConfig::default()).await;
//! println!("relay listening on http://{addr}");
//! ```

mod api;
pub mod ratelimit;
mod server;

pub use api::{AppState, HttpError, RelayRequest};
pub use ratelimit::{RateLimitConfig, RateLimiter};

use std::net::SocketAddr;
use std::sync::Arc;

/// Configuration for the relay server.
pub struct RelayConfig {
    /// Address to bind to. Default: `127.0.0.1:3000`.
    pub bind_addr: SocketAddr,
    /// Rate limiter settings; `None` disables rate limiting. Default: 60
    /// requests per minute per client.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

/// Spawn the relay server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down. A limiter built from
/// `config.rate_limit` replaces whatever `state.limiter` held.
pub async fn spawn_relay(mut state: AppState, config: RelayConfig) -> SocketAddr {
    state.limiter = config
        .rate_limit
        .map(|rl| Arc::new(RateLimiter::new(rl)));
    let router = server::build_router(state);
    server::start_server(router, config.bind_addr).await
}
