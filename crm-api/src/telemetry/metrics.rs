//! Prometheus Metrics Definitions
//!
//! Defines the CRM API metrics and exposes a /metrics endpoint for
//! Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Query runner latency buckets (seconds)
const RUNNER_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Schema generation is CPU bound and usually sub-second.
const SCHEMA_BUILD_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<CrmMetrics>> = Lazy::new(CrmMetrics::new);

#[derive(Clone)]
pub struct CrmMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Query runner operation counter - labels: method, object, status
    pub runner_operations_total: CounterVec,

    /// Query runner duration histogram - labels: method, object
    pub runner_operation_duration_seconds: HistogramVec,

    /// Schema cache lookups - labels: result (hit/miss)
    pub schema_cache_lookups_total: CounterVec,

    /// Workspace schema build duration - labels: status
    pub schema_build_duration_seconds: HistogramVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl CrmMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "crm_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "crm_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            runner_operations_total: register_counter_vec!(
                "crm_runner_operations_total",
                "Total number of workspace query runner operations",
                &["method", "object", "status"]
            )
            .map_err(|e| registration_error("runner_operations_total", e))?,

            runner_operation_duration_seconds: register_histogram_vec!(
                "crm_runner_operation_duration_seconds",
                "Workspace query runner operation duration in seconds",
                &["method", "object"],
                RUNNER_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("runner_operation_duration_seconds", e))?,

            schema_cache_lookups_total: register_counter_vec!(
                "crm_schema_cache_lookups_total",
                "Workspace schema cache lookups",
                &["result"]
            )
            .map_err(|e| registration_error("schema_cache_lookups_total", e))?,

            schema_build_duration_seconds: register_histogram_vec!(
                "crm_schema_build_duration_seconds",
                "Workspace GraphQL schema build duration in seconds",
                &["status"],
                SCHEMA_BUILD_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("schema_build_duration_seconds", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a query runner operation.
    pub fn record_runner_operation(
        &self,
        method: &str,
        object: &str,
        success: bool,
        duration_secs: f64,
    ) {
        let status = if success { "success" } else { "error" };
        self.runner_operations_total
            .with_label_values(&[method, object, status])
            .inc();
        self.runner_operation_duration_seconds
            .with_label_values(&[method, object])
            .observe(duration_secs);
    }

    pub fn record_schema_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.schema_cache_lookups_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn record_schema_build(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.schema_build_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }
}

/// Runs `f` against the global metrics when they registered successfully.
pub fn with_metrics(f: impl FnOnce(&CrmMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
