//! REST endpoint handlers for the relay API.
//!
//! The relay speaks a messages-style completion protocol: clients POST a
//! conversation to `/v1/messages`, the handler optimizes the history through
//! the [`ContextManager`], forwards the result upstream, and annotates the
//! response with `_relay_metadata` describing what the optimizer did.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crimp_rs::cache::SharedCache;
use crimp_rs::context::tokenizer::{OracleError, TokenOracle};
use crimp_rs::upstream::{BackendError, CompletionBackend, CompletionRequest};
use crimp_rs::{ApiError, ContextManager, Message, Metrics, generate_conversation_id};

use crate::ratelimit::{Decision, RateLimiter};

/// Shared application state passed to all handlers via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ContextManager>,
    pub backend: Arc<dyn CompletionBackend>,
    pub oracle: Arc<dyn TokenOracle>,
    pub metrics: Arc<Metrics>,
    pub shared_cache: Option<Arc<dyn SharedCache>>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub default_model: String,
    pub default_max_tokens: u32,
}

// ── Error responses ────────────────────────────────────────────────

/// Newtype so [`ApiError`] can carry axum's `IntoResponse`.
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ApiError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": {
                "type": self.0.kind(),
                "message": self.0.to_string(),
                "code": self.0.code(),
            }
        }));
        (status_for(&self.0), body).into_response()
    }
}

/// Map an upstream failure onto the relay's error taxonomy. Permanent
/// upstream rejections pass through with their own status; everything else
/// is reported as a relay-side server error.
fn map_backend_error(err: BackendError) -> HttpError {
    let api = match err {
        BackendError::Http { status: 400, body } => ApiError::BadRequest(body),
        BackendError::Http { status: 401, body } => ApiError::Unauthorized(body),
        BackendError::Http { status: 403, body } => ApiError::Forbidden(body),
        BackendError::Http { status: 404, body } => ApiError::NotFound(body),
        BackendError::Http { status: 429, body } => ApiError::RateLimited(body),
        BackendError::Http { status, body } => {
            ApiError::ServerError(format!("upstream returned {status}: {body}"))
        }
        other => ApiError::ServerError(other.to_string()),
    };
    HttpError(api)
}

// ── POST /v1/messages ──────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// Request body for POST /v1/messages. `messages` is `Option` so a missing
/// field maps to a structured 400 instead of axum's plain-text rejection.
#[derive(Deserialize)]
pub struct RelayRequest {
    pub messages: Option<Vec<Message>>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub conversation_id: Option<String>,
    /// Opt-out switch for history optimization. Defaults to on.
    #[serde(default = "default_true")]
    pub context_optimization: bool,
}

/// POST /v1/messages — Context-optimized completion relay.
pub async fn post_messages(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RelayRequest>,
) -> Response {
    let start = Instant::now();
    app.metrics.record_request();

    let mut decision = None;
    if let Some(limiter) = &app.limiter {
        let verdict = limiter.check(client_id(&headers));
        if !verdict.allowed {
            app.metrics.record_failure();
            let err = HttpError(ApiError::RateLimited(format!(
                "rate limit of {} requests per minute exceeded",
                verdict.limit
            )));
            return with_rate_limit_headers(err.into_response(), &verdict);
        }
        decision = Some(verdict);
    }

    let outcome = handle_messages(&app, body).await;
    app.metrics.record_processing_time(start.elapsed());

    let mut response = match outcome {
        Ok(json) => {
            app.metrics.record_success();
            json.into_response()
        }
        Err(err) => {
            app.metrics.record_failure();
            err.into_response()
        }
    };
    if let Some(verdict) = decision {
        response = with_rate_limit_headers(response, &verdict);
    }
    response
}

async fn handle_messages(
    app: &AppState,
    body: RelayRequest,
) -> Result<Json<serde_json::Value>, HttpError> {
    let messages = body
        .messages
        .ok_or_else(|| ApiError::BadRequest("missing required field: messages".into()))?;
    let model = body.model.unwrap_or_else(|| app.default_model.clone());
    let max_tokens = body.max_tokens.unwrap_or(app.default_max_tokens);
    let conversation_id = body.conversation_id.unwrap_or_else(generate_conversation_id);

    let original_count = messages.len();
    let (outbound, optimized_count, cache_hit, degraded) = if body.context_optimization {
        let result = app
            .manager
            .optimize_with(&messages, &conversation_id, &model, max_tokens)
            .await?;
        info!(
            conversation_id,
            original = result.original_count,
            optimized = result.optimized_count,
            cache_hit = ?result.cache_hit,
            degraded = result.degraded,
            "context pass complete"
        );
        (
            result.messages,
            result.optimized_count,
            result.cache_hit,
            result.degraded,
        )
    } else {
        (messages, original_count, None, false)
    };
    // The counts can be equal even when a prefix was summarized (one message
    // compressed into one summary), so the flag reflects whether the
    // optimization path actually ran, not the count delta.
    let context_optimized = cache_hit.is_some();

    let request = CompletionRequest {
        model: model.clone(),
        messages: outbound,
        max_tokens,
        system: body.system,
        temperature: body.temperature,
        top_p: body.top_p,
        top_k: body.top_k,
        stop_sequences: body.stop_sequences,
    };
    let completion = app
        .backend
        .generate(&request)
        .await
        .map_err(map_backend_error)?;

    Ok(Json(serde_json::json!({
        "model": model,
        "content": [{"type": "text", "text": completion.text}],
        "stop_reason": completion.stop_reason,
        "usage": completion.usage,
        "_relay_metadata": {
            "context_optimized": context_optimized,
            "original_message_count": original_count,
            "optimized_message_count": optimized_count,
            "conversation_id": conversation_id,
            "cache_hit": cache_hit,
            "degraded": degraded,
        },
    })))
}

/// Rate-limit identity: API key when presented, else the forwarded peer
/// address, else a shared anonymous bucket.
fn client_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-api-key")
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
}

fn with_rate_limit_headers(mut response: Response, decision: &Decision) -> Response {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_secs));
    response
}

// ── GET /v1/token-count ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TokenCountParams {
    pub text: String,
    pub model: Option<String>,
}

/// GET /v1/token-count?text=...&model=... — Oracle passthrough.
pub async fn get_token_count(
    State(app): State<AppState>,
    Query(params): Query<TokenCountParams>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let model = params.model.unwrap_or_else(|| app.default_model.clone());
    let count = app
        .oracle
        .count(&params.text, &model)
        .await
        .map_err(|err| match err {
            OracleError::UnknownModel(m) => ApiError::BadRequest(format!("unknown model: {m}")),
            OracleError::Unavailable(msg) => {
                ApiError::ServerError(format!("tokenizer unavailable: {msg}"))
            }
        })?;
    app.metrics.record_tokens_counted(count.into());

    Ok(Json(serde_json::json!({
        "token_count": count,
        "model": model,
    })))
}

// ── Observability endpoints ────────────────────────────────────────

/// GET /metrics — Counter snapshot with derived rates.
pub async fn get_metrics(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(app.metrics.snapshot()).unwrap_or_default())
}

/// POST /metrics/reset — Zero the counters and restart the uptime clock.
pub async fn post_metrics_reset(State(app): State<AppState>) -> StatusCode {
    app.metrics.reset();
    StatusCode::NO_CONTENT
}

/// GET /health — Liveness, including shared-cache reachability. A broken
/// shared cache reports as degraded but never fails the probe.
pub async fn get_health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let shared_cache = match &app.shared_cache {
        None => "disabled",
        Some(cache) => match cache.ping().await {
            Ok(()) => "ok",
            Err(_) => "unreachable",
        },
    };
    Json(serde_json::json!({
        "status": "ok",
        "shared_cache": shared_cache,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
