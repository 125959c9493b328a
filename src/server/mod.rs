pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Build the control router: play action, content-ended signal, status
pub fn build_router(state: AppState) -> Router {
    // CORS layer: permissive in dev mode so a local page can drive the player
    let cors = if state.config.is_dev {
        info!("CORS: Permissive mode (dev)");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS: Restrictive mode (prod)");
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::serve_metrics))
        .route("/play", post(handlers::playback::play))
        .route("/content-ended", post(handlers::playback::content_ended))
        .route("/status", get(handlers::playback::status))
        .layer(cors)
        .with_state(state)
}

/// Start the Axum HTTP server
pub async fn start(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("🚀 Server listening on http://{}", addr);
    info!("▶️  Play: curl -X POST http://{}/play", addr);

    // Start serving
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
