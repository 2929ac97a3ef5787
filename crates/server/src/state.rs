//! Application State
//!
//! Shared state across all handlers. The service graph is built once from
//! settings; a configuration change means a restart.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use contact_agent_agent::MessagePipeline;
use contact_agent_config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub pipeline: Arc<MessagePipeline>,
    /// Absent when another recorder was installed first
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Settings, pipeline: Arc<MessagePipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
