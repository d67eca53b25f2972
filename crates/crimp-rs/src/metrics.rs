//! Process-wide relay metrics with an explicit lifecycle.
//!
//! Counters are plain atomics behind an `Arc`, injected into whoever needs
//! to record something. There is no module-level mutable state: construct a
//! [`Metrics`], share it, snapshot it, reset it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Atomic counters for relay activity. Safe to share and increment from any
/// number of concurrent workers.
#[derive(Debug)]
pub struct Metrics {
    requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_processing_ms: AtomicU64,
    tokens_counted: AtomicU64,
    optimized_contexts: AtomicU64,
    cached_summaries_used: AtomicU64,
    new_summaries_created: AtomicU64,
    reset_at: Mutex<Instant>,
}

/// Point-in-time view of the counters, plus derived rates.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_processing_ms: u64,
    pub tokens_counted: u64,
    pub optimized_contexts: u64,
    pub cached_summaries_used: u64,
    pub new_summaries_created: u64,
    pub uptime_secs: u64,
    pub average_processing_ms: f64,
    pub requests_per_minute: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_processing_ms: AtomicU64::new(0),
            tokens_counted: AtomicU64::new(0),
            optimized_contexts: AtomicU64::new(0),
            cached_summaries_used: AtomicU64::new(0),
            new_summaries_created: AtomicU64::new(0),
            reset_at: Mutex::new(Instant::now()),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_time(&self, elapsed: Duration) {
        self.total_processing_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_tokens_counted(&self, n: u64) {
        self.tokens_counted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_optimized_context(&self) {
        self.optimized_contexts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cached_summary(&self) {
        self.cached_summaries_used.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_new_summary(&self) {
        self.new_summaries_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Capture the current counter values and derived averages.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_processing_ms = self.total_processing_ms.load(Ordering::Relaxed);
        let uptime = self
            .reset_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed();

        let average_processing_ms = if requests > 0 {
            total_processing_ms as f64 / requests as f64
        } else {
            0.0
        };
        let minutes = uptime.as_secs_f64() / 60.0;
        let requests_per_minute = if minutes > 0.0 {
            requests as f64 / minutes
        } else {
            0.0
        };

        MetricsSnapshot {
            requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_processing_ms,
            tokens_counted: self.tokens_counted.load(Ordering::Relaxed),
            optimized_contexts: self.optimized_contexts.load(Ordering::Relaxed),
            cached_summaries_used: self.cached_summaries_used.load(Ordering::Relaxed),
            new_summaries_created: self.new_summaries_created.load(Ordering::Relaxed),
            uptime_secs: uptime.as_secs(),
            average_processing_ms,
            requests_per_minute,
        }
    }

    /// Zero all counters and restart the uptime clock.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.total_processing_ms.store(0, Ordering::Relaxed);
        self.tokens_counted.store(0, Ordering::Relaxed);
        self.optimized_contexts.store(0, Ordering::Relaxed);
        self.cached_summaries_used.store(0, Ordering::Relaxed);
        self.new_summaries_created.store(0, Ordering::Relaxed);
        *self.reset_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_tokens_counted(42);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.successful_requests, 1);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.tokens_counted, 42);
    }

    #[test]
    fn average_processing_time() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_processing_time(Duration::from_millis(100));
        metrics.record_processing_time(Duration::from_millis(300));

        let snap = metrics.snapshot();
        assert!((snap.average_processing_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_optimized_context();
        metrics.record_cached_summary();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.optimized_contexts, 0);
        assert_eq!(snap.cached_summaries_used, 0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = Metrics::new();
        metrics.record_new_summary();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["new_summaries_created"], 1);
        assert!(json["uptime_secs"].is_u64());
    }
}
