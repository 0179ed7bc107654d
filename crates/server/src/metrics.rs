//! Prometheus Metrics
//!
//! Installs a global recorder at startup and renders it at /metrics.
//! The record_* helpers are no-ops until init_metrics has run, so library
//! code can call them unconditionally.

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Instant;

use sentinel_advisor::ChatOutcome;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Safe to call once per process;
/// a second call logs and returns None.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle.clone());
            describe();
            Some(handle)
        },
        Err(e) => {
            tracing::warn!("Failed to install Prometheus recorder: {}", e);
            None
        },
    }
}

fn describe() {
    metrics::describe_counter!(
        "sentinel_requests_total",
        "HTTP requests by method, route and status"
    );
    metrics::describe_histogram!(
        "sentinel_request_duration_seconds",
        "HTTP request latency by route"
    );
    metrics::describe_counter!(
        "sentinel_chat_messages_total",
        "Handled chat messages by intent, agent, escalated and fallback"
    );
    metrics::describe_histogram!(
        "sentinel_chat_latency_seconds",
        "End-to-end chat pipeline latency"
    );
    metrics::describe_counter!("sentinel_errors_total", "Errors by kind");
}

pub fn record_request(method: &str, route: &str, status: u16) {
    metrics::counter!(
        "sentinel_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(route: &str, seconds: f64) {
    metrics::histogram!(
        "sentinel_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(seconds);
}

/// One handled chat message, labeled for the routing dashboard
pub fn record_chat(outcome: &ChatOutcome) {
    metrics::counter!(
        "sentinel_chat_messages_total",
        "intent" => outcome.classification.category.as_str(),
        "agent" => outcome.agent_type.clone(),
        "escalated" => if outcome.escalated { "true" } else { "false" },
        "fallback" => if outcome.fallback { "true" } else { "false" }
    )
    .increment(1);
    metrics::histogram!("sentinel_chat_latency_seconds")
        .record(outcome.latency_ms as f64 / 1000.0);
}

pub fn record_error(kind: &str) {
    metrics::counter!("sentinel_errors_total", "kind" => kind.to_string()).increment(1);
}

/// Request-accounting middleware; uses the matched route template so path
/// parameters don't explode label cardinality
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    record_request(&method, &route, response.status().as_u16());
    record_request_duration(&route, started.elapsed().as_secs_f64());
    response
}

/// Render the Prometheus exposition text
pub async fn metrics_handler() -> Result<String, StatusCode> {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The helpers must be callable before any recorder is installed
    #[test]
    fn test_record_without_recorder_is_noop() {
        record_request("GET", "/health", 200);
        record_request_duration("/health", 0.001);
        record_error("llm");
    }
}
