//! End-to-end tests for the Bidplay control server
//!
//! Starts a real Axum server on a random port, backed by a running
//! orchestrator, and drives it over HTTP.

mod common;

use bidplay::ad::{StaticAd, StaticAdEngine};
use bidplay::auction::{AuctionCoordinator, NoBidEngine};
use bidplay::config::{AuctionEngineType, Config};
use bidplay::content::ContentController;
use bidplay::orchestrator::{Orchestrator, OrchestratorSettings};
use bidplay::server::{build_router, state::AppState};
use common::RecordingContent;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Start a test server on a random port and return its address
async fn start_test_server() -> SocketAddr {
    let config = Config {
        port: 0,
        auction_engine: AuctionEngineType::NoBid,
        // Long enough that the session is still in flight for the test
        static_ad: StaticAd {
            ad_id: "e2e-preroll".to_string(),
            duration: Duration::from_secs(30),
            is_linear: true,
        },
        ..Config::default()
    };

    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorSettings::from(&config),
        AuctionCoordinator::new(Arc::new(NoBidEngine)),
        Arc::new(StaticAdEngine::new(config.static_ad.clone())),
        ContentController::new(Box::new(RecordingContent::default())),
    );
    tokio::spawn(orchestrator.run());

    let app = build_router(AppState::new(config, handle, None));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

#[tokio::test]
async fn health_check() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_active"], false);
}

#[tokio::test]
async fn play_then_conflict() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/play", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["session_id"], 1);

    let resp = client
        .post(format!("http://{}/play", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["session_active"], true);
}

#[tokio::test]
async fn status_reports_session() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["session_id"].is_null());
    assert_eq!(body["content"], "idle");
    assert_eq!(body["sessions_started"], 0);

    client
        .post(format!("http://{}/play", addr))
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("http://{}/status", addr))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["session_id"], 1);
    assert_eq!(body["sessions_started"], 1);
}

#[tokio::test]
async fn content_ended_accepted() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/content-ended", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn metrics_unavailable_without_recorder() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
