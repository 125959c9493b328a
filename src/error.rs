use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Domain-specific error types for Bidplay
#[derive(Error, Debug)]
pub enum BidplayError {
    #[error("Invalid auction request: {0}")]
    InvalidRequest(String),

    #[error("Auction engine failed: {0}")]
    AuctionEngine(String),

    #[error("Failed to build ad tag URL: {0}")]
    TagBuild(String),

    #[error("Invalid ad tag URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Ad decision engine failed: {0}")]
    AdEngine(String),

    #[error("A playback session is already in flight: {0}")]
    SessionInFlight(u64),

    #[error("Orchestrator is not running")]
    OrchestratorStopped,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// Implement IntoResponse for BidplayError to handle HTTP responses
impl IntoResponse for BidplayError {
    fn into_response(self) -> Response {
        let status = match &self {
            BidplayError::InvalidRequest(e) => {
                tracing::error!("Invalid auction request: {}", e);
                StatusCode::BAD_REQUEST
            }
            BidplayError::SessionInFlight(id) => {
                tracing::warn!(session_id = id, "Play rejected, session in flight");
                StatusCode::CONFLICT
            }
            BidplayError::OrchestratorStopped => {
                tracing::error!("Orchestrator is not running");
                StatusCode::SERVICE_UNAVAILABLE
            }
            BidplayError::AuctionEngine(e) => {
                tracing::error!("Auction engine error: {}", e);
                StatusCode::BAD_GATEWAY
            }
            BidplayError::AdEngine(e) => {
                tracing::error!("Ad engine error: {}", e);
                StatusCode::BAD_GATEWAY
            }
            BidplayError::TagBuild(e) => {
                tracing::error!("Tag build error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BidplayError::InvalidUrl(e) => {
                tracing::error!("Invalid URL: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BidplayError::ConfigError(e) => {
                tracing::error!("Configuration error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, BidplayError>;
