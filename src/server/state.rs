use crate::{config::Config, orchestrator::OrchestratorHandle};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Handle to the playback orchestrator
    pub orchestrator: OrchestratorHandle,
    /// Prometheus recorder handle; absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Server start time for uptime tracking
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: OrchestratorHandle,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            metrics,
            started_at: Instant::now(),
        }
    }
}
