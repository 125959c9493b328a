use bidplay::ad::{AdDecisionEngine, StaticAdEngine};
use bidplay::auction::{AuctionCoordinator, AuctionEngine, NoBidEngine, PrebidServerEngine};
use bidplay::config::{AuctionEngineType, Config};
use bidplay::content::{ContentController, HeadlessContent};
use bidplay::orchestrator::{Orchestrator, OrchestratorSettings};
use bidplay::server::{self, state::AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting Bidplay - header bidding video ad orchestrator");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled, failed to install Prometheus recorder: {}", e);
            None
        }
    };

    let auction_engine: Arc<dyn AuctionEngine> = match config.auction_engine {
        AuctionEngineType::PrebidServer => {
            info!("Auction engine: Prebid Server ({})", config.prebid_server_url);
            let http_client = match reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
            {
                Ok(client) => client,
                Err(e) => {
                    error!("Failed to create HTTP client: {}", e);
                    std::process::exit(1);
                }
            };
            let engine = PrebidServerEngine::new(
                config.prebid_server_url.clone(),
                config.prebid_account_id.clone(),
                http_client,
            )
            .with_consent(config.consent.clone());
            Arc::new(engine)
        }
        AuctionEngineType::NoBid => {
            info!("Auction engine: none (ad server only)");
            Arc::new(NoBidEngine)
        }
    };

    info!(
        "Ad engine: static ({} {}s ad)",
        if config.static_ad.is_linear { "linear" } else { "non-linear" },
        config.static_ad.duration.as_secs()
    );
    let ad_engine: Arc<dyn AdDecisionEngine> =
        Arc::new(StaticAdEngine::new(config.static_ad.clone()));

    let content = ContentController::new(Box::new(HeadlessContent::new(
        config.content_element_id.clone(),
    )));

    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorSettings::from(&config),
        AuctionCoordinator::new(auction_engine),
        ad_engine,
        content,
    );
    tokio::spawn(orchestrator.run());

    // Start HTTP server
    if let Err(e) = server::start(AppState::new(config, handle, prometheus)).await {
        error!("Failed to start server: {}", e);
        std::process::exit(1);
    }
}
