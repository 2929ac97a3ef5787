//! Prometheus metrics
//!
//! Counters and histograms are recorded through the `metrics` facade; the
//! recorder installed by [`init_metrics`] renders them at `/metrics`.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Install the global Prometheus recorder.
///
/// Returns `None` when a recorder is already installed (tests, re-init).
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        },
    }
}

/// Inbound message, labelled by how it was routed
pub fn record_message(route: &'static str) {
    metrics::counter!("contact_agent_messages_total", "route" => route).increment(1);
}

pub fn record_intent(intent: &'static str) {
    metrics::counter!("contact_agent_intents_total", "intent" => intent).increment(1);
}

pub fn record_reply(kind: &'static str) {
    metrics::counter!("contact_agent_replies_total", "kind" => kind).increment(1);
}

pub fn record_registration_completed() {
    metrics::counter!("contact_agent_registrations_completed_total").increment(1);
}

pub fn record_error(component: &'static str) {
    metrics::counter!("contact_agent_errors_total", "component" => component).increment(1);
}

/// End-to-end pipeline latency
pub fn record_latency(elapsed: Duration) {
    metrics::histogram!("contact_agent_pipeline_latency_seconds").record(elapsed.as_secs_f64());
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.as_ref() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
