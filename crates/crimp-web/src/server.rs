//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - `POST /v1/messages` — context-optimized completion relay
/// - `GET /v1/token-count` — token oracle passthrough
/// - `GET /metrics`, `POST /metrics/reset` — counter lifecycle
/// - `GET /health` — liveness and shared-cache reachability
pub fn build_router(state: AppState) -> Router {
    // Permissive CORS: the relay is meant to sit behind a client's own
    // infrastructure, not to enforce browser policy.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(api::post_messages))
        .route("/v1/token-count", get(api::get_token_count))
        .route("/metrics", get(api::get_metrics))
        .route("/metrics/reset", post(api::post_metrics_reset))
        .route("/health", get(api::get_health))
        .with_state(state)
        .layer(cors)
}

/// Start the axum server and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}
