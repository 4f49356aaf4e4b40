//! Prometheus scrape endpoint and metric descriptions
//!
//! The handler renders the global `metrics-exporter-prometheus` recorder.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusHandle;

/// Shared state for the metrics endpoint
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
}

/// Register help texts for every metric the service records. Call once,
/// after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!("http_requests_total", "HTTP requests by method, route, module and status");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency by method, route and module"
    );
    describe_counter!(
        "ocpi_auth_failures_total",
        "Rejected OCPI requests by module and reason"
    );
    describe_counter!("ocpi_sync_events_total", "Network events consumed by the sync adapter");
    describe_counter!(
        "ocpi_sync_failures_total",
        "Network events that could not be applied to the object store"
    );
    describe_counter!("ocpi_push_total", "Location pushes to remote parties by outcome");
    describe_counter!(
        "ocpi_events_lagged_total",
        "Internal events dropped because a subscriber fell behind"
    );
    describe_counter!("ocpi_commands_total", "Remote commands by type and outcome");
    describe_histogram!(
        "ocpi_command_ack_seconds",
        Unit::Seconds,
        "Time until the executing party acknowledged a command"
    );
}

/// `GET /metrics`: Prometheus scrape endpoint, no auth
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.handle.render(),
    )
}
