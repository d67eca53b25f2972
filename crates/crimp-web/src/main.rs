//! Context-optimizing completion relay — server entry point.
//!
//! Sits between clients and a hosted completion API, compressing each
//! request's conversation history into the token budget before forwarding.
//!
//! # Usage
//!
//! ```bash
//! UPSTREAM_API_KEY=sk-... cargo run -p crimp-web
//! UPSTREAM_API_KEY=sk-... cargo run -p crimp-web -- --port 8080
//! UPSTREAM_API_KEY=sk-... cargo run -p crimp-web -- --model claude-haiku-4 --max-tokens 2048
//! UPSTREAM_API_KEY=sk-... cargo run -p crimp-web -- --shared-cache-url http://cache:7700
//! ```
//!
//! Then relay completions through it:
//!
//! ```bash
//! curl -s localhost:3000/v1/messages -H 'content-type: application/json' \
//!   -d '{"messages":[{"role":"user","content":"hello"}]}'
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crimp_rs::cache::{HttpSharedCache, SharedCache};
use crimp_rs::prelude::*;
use crimp_web::{AppState, RateLimitConfig, RelayConfig, spawn_relay};

/// Context-optimizing completion relay.
#[derive(Parser)]
#[command(about = "Relay completions through a token-budget context optimizer")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Base URL of the upstream completion API.
    #[arg(long, default_value = "https://api.anthropic.com")]
    upstream_url: String,

    /// Default model when a request does not name one.
    #[arg(long, default_value = crimp_rs::DEFAULT_MODEL)]
    model: String,

    /// Default token budget when a request does not set max_tokens.
    #[arg(long, default_value_t = crimp_rs::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Base URL of the shared summary cache service. Omit for local-only
    /// caching.
    #[arg(long)]
    shared_cache_url: Option<String>,

    /// Requests per minute per client; 0 disables rate limiting.
    #[arg(long, default_value_t = 60)]
    rate_limit: u32,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let api_key = std::env::var("UPSTREAM_API_KEY")
        .map_err(|_| "Set UPSTREAM_API_KEY env var to your upstream API key")?;
    let backend: Arc<dyn CompletionBackend> = Arc::new(
        CompletionClient::new(&args.upstream_url, api_key).map_err(|e| e.to_string())?,
    );
    let oracle: Arc<dyn TokenOracle> = Arc::new(HeuristicOracle::default());
    let metrics = Arc::new(Metrics::new());

    let shared_cache: Option<Arc<dyn SharedCache>> = match &args.shared_cache_url {
        Some(url) => {
            info!(%url, "shared summary cache enabled");
            Some(Arc::new(HttpSharedCache::new(url.clone()).map_err(|e| e.to_string())?))
        }
        None => None,
    };

    let manager = Arc::new(ContextManager::new(
        ContextConfig::new(args.model.clone(), args.max_tokens),
        oracle.clone(),
        backend.clone(),
        shared_cache.clone(),
        metrics.clone(),
    ));

    let state = AppState {
        manager,
        backend,
        oracle,
        metrics,
        shared_cache,
        limiter: None,
        default_model: args.model,
        default_max_tokens: args.max_tokens,
    };
    let config = RelayConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        rate_limit: (args.rate_limit > 0).then(|| RateLimitConfig {
            max_requests: args.rate_limit,
            window: Duration::from_secs(60),
        }),
    };

    let addr = spawn_relay(state, config).await;
    info!(%addr, upstream = %args.upstream_url, "relay listening");

    tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
    info!("shutting down");
    Ok(())
}
