//! Wire types and HTTP client for the downstream completion service.
//!
//! The relay talks to a hosted messages-style completion API: a request
//! carries a model, a message list, and generation parameters; the response
//! carries text content blocks plus token usage. The same client serves two
//! callers: the boundary layer (final answers) and the
//! [`Summarizer`](crate::context::summarizer::Summarizer) (segment
//! compression).
//!
//! - [`CompletionBackend`] is the injectable seam. Production code uses
//!   [`CompletionClient`]; tests substitute stubs.
//! - [`retry`] holds the backoff configuration for transient upstream
//!   failures (429, 5xx, network errors). Permanent failures (400, 401) are
//!   never retried.

pub mod retry;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::Message;
pub use retry::RetryConfig;

// ── Request / response wire types ──────────────────────────────────

/// Completion request body. Optional generation parameters are omitted from
/// serialization when unset.
#[derive(Serialize, Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Token usage reported by the upstream service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

/// Raw response shape (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawCompletionResponse {
    content: Option<Vec<RawContentBlock>>,
    usage: Option<Usage>,
    stop_reason: Option<String>,
    error: Option<RawErrorBody>,
}

#[derive(Deserialize, Debug)]
struct RawContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawErrorBody {
    message: String,
}

/// Clean return type from a completion call: the concatenated text content
/// plus whatever usage the service reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Failure talking to the downstream completion service.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("upstream HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("upstream returned an empty completion")]
    Empty,
}

impl BackendError {
    /// Whether a retry could plausibly succeed. 400/401/403/404 are
    /// permanent; rate limits, server errors, and network failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            BackendError::Transport(_) => true,
            BackendError::Malformed(_) | BackendError::Empty => false,
        }
    }
}

// ── Backend trait ──────────────────────────────────────────────────

/// Injectable completion collaborator. The engine only ever needs "messages
/// in, text out"; everything else is an implementation detail of the client.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the hosted completion API, with retry on transient
/// failures.
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl CompletionClient {
    /// Create a client against `base_url` (no trailing slash) with default
    /// timeouts and retry policy.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crimp/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry: RetryConfig::default(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, body: &CompletionRequest) -> Result<Completion, BackendError> {
        debug!(
            model = %body.model,
            messages = body.messages.len(),
            max_tokens = body.max_tokens,
            "completion request"
        );
        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            bytes = text.len(),
            "completion response"
        );

        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RawCompletionResponse =
            serde_json::from_str(&text).map_err(|e| BackendError::Malformed(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: err.message,
            });
        }

        let text: String = parsed
            .content
            .unwrap_or_default()
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect();

        if text.is_empty() {
            return Err(BackendError::Empty);
        }

        Ok(Completion {
            text,
            usage: parsed.usage,
            stop_reason: parsed.stop_reason,
        })
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
