use crate::error::Result;
use crate::orchestrator::StatusSnapshot;
use crate::server::state::AppState;
use crate::session::SessionId;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
pub struct PlayResponse {
    pub session_id: SessionId,
}

/// The play button: start a playback session
///
/// 202 with the new session id, 409 while a session is in flight.
pub async fn play(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let session_id = state.orchestrator.play().await?;
    info!(session_id, "Play action accepted");
    Ok((StatusCode::ACCEPTED, Json(PlayResponse { session_id })))
}

/// Content element reached its end
pub async fn content_ended(State(state): State<AppState>) -> Result<StatusCode> {
    state.orchestrator.content_ended().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusSnapshot>> {
    Ok(Json(state.orchestrator.status().await?))
}
