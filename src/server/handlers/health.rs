use crate::server::state::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub session_active: bool,
    pub uptime_seconds: u64,
}

/// Health check endpoint returning structured JSON diagnostics
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    // A stopped orchestrator still answers health, reported as degraded
    let (status, session_active) = match state.orchestrator.status().await {
        Ok(snapshot) => ("ok", snapshot.session_id.is_some()),
        Err(_) => ("degraded", false),
    };

    Json(HealthResponse {
        status,
        version: VERSION,
        session_active,
        uptime_seconds: uptime,
    })
}
