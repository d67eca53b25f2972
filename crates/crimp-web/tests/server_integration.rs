//! Integration tests for the relay server.
//!
//! These tests start a real axum server on a random port with a stubbed
//! completion backend and exercise the REST endpoints end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crimp_rs::context::tokenizer::HeuristicOracle;
use crimp_rs::upstream::{BackendError, Completion, CompletionBackend, CompletionRequest, Usage};
use crimp_rs::{ContextConfig, ContextManager, Metrics};
use crimp_web::{AppState, RateLimitConfig, RelayConfig, spawn_relay};

/// Backend stub that records calls and returns a canned completion.
struct StubBackend {
    calls: AtomicU32,
}

impl StubBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: "Hello from upstream.".into(),
            usage: Some(Usage {
                input_tokens: Some(10),
                output_tokens: Some(5),
            }),
            stop_reason: Some("end_turn".into()),
        })
    }
}

/// Backend stub that rejects every call with a fixed upstream status.
struct RejectingBackend(u16);

#[async_trait]
impl CompletionBackend for RejectingBackend {
    async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, BackendError> {
        Err(BackendError::Http {
            status: self.0,
            body: "rejected by upstream".into(),
        })
    }
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(
    backend: Arc<dyn CompletionBackend>,
    rate_limit: Option<RateLimitConfig>,
) -> String {
    let oracle = Arc::new(HeuristicOracle::default());
    let metrics = Arc::new(Metrics::new());
    let manager = Arc::new(ContextManager::new(
        ContextConfig::new("test-model", 4096),
        oracle.clone(),
        backend.clone(),
        None,
        metrics.clone(),
    ));

    let state = AppState {
        manager,
        backend,
        oracle,
        metrics,
        shared_cache: None,
        limiter: None,
        default_model: "test-model".into(),
        default_max_tokens: 4096,
    };
    let config = RelayConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        rate_limit,
    };

    let addr = spawn_relay(state, config).await;
    format!("http://{addr}")
}

fn long_conversation(n: usize) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "role": if i % 2 == 0 { "user" } else { "assistant" },
                "content": format!("message {i}: {}", "padding ".repeat(12)),
            })
        })
        .collect();
    serde_json::Value::Array(messages)
}

// ── POST /v1/messages ──────────────────────────────────────────────

#[tokio::test]
async fn relay_annotates_responses_with_optimization_metadata() {
    let backend = StubBackend::new();
    let base = spawn_test_server(backend.clone(), None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({
            "messages": long_conversation(20),
            "max_tokens": 256,
            "conversation_id": "conv_test",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["content"][0]["text"], "Hello from upstream.");
    assert_eq!(json["stop_reason"], "end_turn");

    let meta = &json["_relay_metadata"];
    assert_eq!(meta["context_optimized"], true);
    assert_eq!(meta["original_message_count"], 20);
    assert!(meta["optimized_message_count"].as_u64().unwrap() < 20);
    assert_eq!(meta["conversation_id"], "conv_test");
    // Two upstream calls: one summarization, one final completion.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn equal_counts_still_report_optimized_when_a_prefix_was_summarized() {
    let backend = StubBackend::new();
    let base = spawn_test_server(backend.clone(), None).await;

    // Two messages over budget where exactly one gets compressed: the
    // optimized sequence is summary + kept, so the counts stay equal even
    // though the content changed.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({
            "messages": [
                {"role": "user", "content": "a".repeat(1200)},
                {"role": "assistant", "content": "b".repeat(1100)},
            ],
            "max_tokens": 400,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    let meta = &json["_relay_metadata"];
    assert_eq!(meta["original_message_count"], 2);
    assert_eq!(meta["optimized_message_count"], 2);
    assert_eq!(meta["context_optimized"], true);
    assert_eq!(meta["cache_hit"], false);
    // Summarization plus the final completion.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn short_histories_pass_through_unoptimized() {
    let backend = StubBackend::new();
    let base = spawn_test_server(backend.clone(), None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    let meta = &json["_relay_metadata"];
    assert_eq!(meta["context_optimized"], false);
    assert_eq!(meta["original_message_count"], 1);
    assert_eq!(meta["optimized_message_count"], 1);
    assert!(
        meta["conversation_id"]
            .as_str()
            .unwrap()
            .starts_with("conv_")
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bypass_flag_skips_optimization() {
    let backend = StubBackend::new();
    let base = spawn_test_server(backend.clone(), None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({
            "messages": long_conversation(20),
            "max_tokens": 256,
            "context_optimization": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["_relay_metadata"]["context_optimized"], false);
    assert_eq!(json["_relay_metadata"]["optimized_message_count"], 20);
    // No summarization call, just the completion itself.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_messages_is_a_structured_400() {
    let base = spawn_test_server(StubBackend::new(), None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({"model": "test-model"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(json["error"]["code"], "bad_request");
}

#[tokio::test]
async fn upstream_auth_failure_maps_to_401() {
    let base = spawn_test_server(Arc::new(RejectingBackend(401)), None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "authentication_error");
}

// ── Rate limiting ──────────────────────────────────────────────────

#[tokio::test]
async fn over_limit_requests_get_429_with_headers() {
    let config = RateLimitConfig {
        max_requests: 2,
        window: std::time::Duration::from_secs(60),
    };
    let base = spawn_test_server(StubBackend::new(), Some(config)).await;

    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "messages": [{"role": "user", "content": "hi"}],
    });

    for _ in 0..2 {
        let resp = client
            .post(format!("{base}/v1/messages"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key("x-ratelimit-remaining"));
    }

    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert_eq!(resp.headers()["x-ratelimit-limit"], "2");
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "rate_limit_error");
}

// ── Token counting and observability ───────────────────────────────

#[tokio::test]
async fn token_count_endpoint_uses_the_oracle() {
    let base = spawn_test_server(StubBackend::new(), None).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/v1/token-count"))
        .query(&[("text", "hello world")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    // 11 chars at 3.5 chars per token, rounded up.
    assert_eq!(json["token_count"], 4);
    assert_eq!(json["model"], "test-model");
}

#[tokio::test]
async fn metrics_accumulate_and_reset() {
    let base = spawn_test_server(StubBackend::new(), None).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .send()
        .await
        .unwrap();

    let snap: serde_json::Value = reqwest::get(format!("{base}/metrics"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snap["requests"], 1);
    assert_eq!(snap["successful_requests"], 1);

    let resp = client
        .post(format!("{base}/metrics/reset"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let snap: serde_json::Value = reqwest::get(format!("{base}/metrics"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snap["requests"], 0);
}

#[tokio::test]
async fn health_reports_cache_state() {
    let base = spawn_test_server(StubBackend::new(), None).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["shared_cache"], "disabled");
}
