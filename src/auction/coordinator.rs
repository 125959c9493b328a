use crate::auction::types::{AuctionConfig, Bid, BidRequest, BidResult};
use crate::error::{BidplayError, Result};
use crate::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// What an auction engine reports when its auction closes
#[derive(Debug)]
struct EngineReport {
    bids: Vec<Bid>,
    timed_out: bool,
    auction_id: String,
}

/// Completion callback handed to an [`AuctionEngine`].
///
/// `complete` consumes the handler, so an engine can report at most once.
/// If the coordinator has already given up on the auction the report is
/// dropped here.
#[derive(Debug)]
pub struct BidsBackHandler {
    tx: oneshot::Sender<EngineReport>,
}

impl BidsBackHandler {
    pub fn complete(self, bids: Vec<Bid>, timed_out: bool, auction_id: impl Into<String>) {
        let auction_id = auction_id.into();
        let report = EngineReport {
            bids,
            timed_out,
            auction_id,
        };
        if let Err(late) = self.tx.send(report) {
            debug!(
                auction_id = %late.auction_id,
                "Auction result arrived after the deadline, discarding"
            );
        }
    }
}

/// Header-bidding auction engine
///
/// Implementations start the auction and return immediately; the result is
/// delivered later through the handler. Bidder adapters, scoring and the
/// transport are the engine's business.
pub trait AuctionEngine: Send + Sync {
    fn submit_auction(
        &self,
        ad_units: Vec<BidRequest>,
        config: AuctionConfig,
        handler: BidsBackHandler,
    ) -> Result<()>;
}

/// Engine that closes every auction immediately with no bids.
///
/// Useful when only the ad server should decide, without header bidding.
#[derive(Debug, Clone, Default)]
pub struct NoBidEngine;

impl AuctionEngine for NoBidEngine {
    fn submit_auction(
        &self,
        _ad_units: Vec<BidRequest>,
        _config: AuctionConfig,
        handler: BidsBackHandler,
    ) -> Result<()> {
        handler.complete(Vec::new(), false, uuid::Uuid::new_v4().to_string());
        Ok(())
    }
}

/// Runs time-bounded auctions against an [`AuctionEngine`]
#[derive(Clone)]
pub struct AuctionCoordinator {
    engine: Arc<dyn AuctionEngine>,
}

impl AuctionCoordinator {
    pub fn new(engine: Arc<dyn AuctionEngine>) -> Self {
        Self { engine }
    }

    /// Run one auction and wait for its result, at most `timeout`.
    ///
    /// Resolves exactly once: with the engine's report if it arrives before
    /// the deadline, otherwise with [`BidResult::TimedOut`]. An engine that
    /// drops its handler without reporting counts as never responding.
    pub async fn run_auction(&self, request: &BidRequest, timeout: Duration) -> Result<BidResult> {
        if timeout.is_zero() {
            return Err(BidplayError::InvalidRequest(
                "auction timeout must be greater than zero".to_string(),
            ));
        }

        let started = Instant::now();
        let deadline = started + timeout;
        let (tx, rx) = oneshot::channel();

        info!(
            ad_unit = %request.code,
            bidders = request.bids.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Requesting bids"
        );

        self.engine.submit_auction(
            vec![request.clone()],
            AuctionConfig { timeout },
            BidsBackHandler { tx },
        )?;

        let result = tokio::select! {
            biased;
            report = rx => match report {
                Ok(report) if report.timed_out => BidResult::TimedOut {
                    auction_id: report.auction_id,
                },
                Ok(report) => BidResult::Success {
                    bids: collapse_by_bidder(report.bids),
                    auction_id: report.auction_id,
                },
                Err(_) => {
                    warn!(
                        ad_unit = %request.code,
                        "Auction engine dropped its handler without reporting"
                    );
                    sleep_until(deadline).await;
                    BidResult::TimedOut {
                        auction_id: uuid::Uuid::new_v4().to_string(),
                    }
                }
            },
            _ = sleep_until(deadline) => BidResult::TimedOut {
                auction_id: uuid::Uuid::new_v4().to_string(),
            },
        };

        metrics::record_auction(result.label(), started.elapsed());

        match &result {
            BidResult::Success { bids, auction_id } => {
                info!(auction_id = %auction_id, "Auction closed, got {} bids", bids.len());
            }
            BidResult::TimedOut { auction_id } => {
                warn!(auction_id = %auction_id, "Bid request timed out");
            }
        }

        Ok(result)
    }
}

/// Keep one bid per bidder, the highest priced
fn collapse_by_bidder(bids: Vec<Bid>) -> BTreeMap<String, Bid> {
    let mut by_bidder: BTreeMap<String, Bid> = BTreeMap::new();
    for bid in bids {
        match by_bidder.get(&bid.bidder) {
            Some(existing) if existing.cpm >= bid.cpm => {}
            _ => {
                by_bidder.insert(bid.bidder.clone(), bid);
            }
        }
    }
    by_bidder
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that answers after a fixed latency, or never
    struct DelayedEngine {
        latency: Option<Duration>,
        bids: Vec<Bid>,
        submissions: AtomicUsize,
    }

    impl DelayedEngine {
        fn new(latency: Option<Duration>, bids: Vec<Bid>) -> Self {
            Self {
                latency,
                bids,
                submissions: AtomicUsize::new(0),
            }
        }
    }

    impl AuctionEngine for DelayedEngine {
        fn submit_auction(
            &self,
            _ad_units: Vec<BidRequest>,
            _config: AuctionConfig,
            handler: BidsBackHandler,
        ) -> Result<()> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            let bids = self.bids.clone();
            match self.latency {
                Some(latency) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(latency).await;
                        handler.complete(bids, false, "auction-1");
                    });
                }
                // Hold on to the handler forever
                None => {
                    tokio::spawn(async move {
                        let _handler = handler;
                        std::future::pending::<()>().await;
                    });
                }
            }
            Ok(())
        }
    }

    fn bid(bidder: &str, cpm: f64) -> Bid {
        Bid {
            bidder: bidder.to_string(),
            cpm,
            ad_id: "ad".to_string(),
            cache_id: None,
            vast_url: None,
            width: 640,
            height: 480,
        }
    }

    fn coordinator(engine: DelayedEngine) -> (AuctionCoordinator, Arc<DelayedEngine>) {
        let engine = Arc::new(engine);
        (AuctionCoordinator::new(engine.clone()), engine)
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_deadline_is_success() {
        let (coord, engine) = coordinator(DelayedEngine::new(
            Some(Duration::from_millis(500)),
            vec![bid("X", 3.1)],
        ));
        let started = Instant::now();
        let result = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(3000))
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(3000));
        assert_eq!(engine.submissions.load(Ordering::SeqCst), 1);
        match result {
            BidResult::Success { bids, auction_id } => {
                assert_eq!(auction_id, "auction-1");
                assert_eq!(bids["X"].cpm, 3.1);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_engine_times_out_at_deadline() {
        let (coord, _) = coordinator(DelayedEngine::new(None, Vec::new()));
        let started = Instant::now();
        let result = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(3000))
            .await
            .unwrap();

        assert!(result.is_timed_out());
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_discarded() {
        let (coord, _) = coordinator(DelayedEngine::new(
            Some(Duration::from_millis(4000)),
            vec![bid("X", 1.0)],
        ));
        let result = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(3000))
            .await
            .unwrap();
        assert!(result.is_timed_out());

        // Let the engine's late callback run; it must not panic or resurface
        tokio::time::sleep(Duration::from_millis(2000)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_exactly_at_deadline_is_success() {
        let (coord, _) = coordinator(DelayedEngine::new(
            Some(Duration::from_millis(3000)),
            Vec::new(),
        ));
        let result = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(3000))
            .await
            .unwrap();
        assert!(!result.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handler_waits_for_deadline() {
        struct DroppingEngine;
        impl AuctionEngine for DroppingEngine {
            fn submit_auction(
                &self,
                _ad_units: Vec<BidRequest>,
                _config: AuctionConfig,
                _handler: BidsBackHandler,
            ) -> Result<()> {
                Ok(())
            }
        }

        let coord = AuctionCoordinator::new(Arc::new(DroppingEngine));
        let started = Instant::now();
        let result = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(1200))
            .await
            .unwrap();
        assert!(result.is_timed_out());
        assert!(started.elapsed() >= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_reported_timeout() {
        struct TimedOutEngine;
        impl AuctionEngine for TimedOutEngine {
            fn submit_auction(
                &self,
                _ad_units: Vec<BidRequest>,
                _config: AuctionConfig,
                handler: BidsBackHandler,
            ) -> Result<()> {
                handler.complete(Vec::new(), true, "auction-t");
                Ok(())
            }
        }

        let coord = AuctionCoordinator::new(Arc::new(TimedOutEngine));
        let result = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(3000))
            .await
            .unwrap();
        assert_eq!(
            result,
            BidResult::TimedOut {
                auction_id: "auction-t".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let coord = AuctionCoordinator::new(Arc::new(NoBidEngine));
        let err = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, BidplayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_participants_is_success_with_no_bids() {
        let coord = AuctionCoordinator::new(Arc::new(NoBidEngine));
        let mut request = BidRequest::default_video_unit();
        request.bids.clear();
        let result = coord
            .run_auction(&request, Duration::from_millis(100))
            .await
            .unwrap();
        match result {
            BidResult::Success { bids, .. } => assert!(bids.is_empty()),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_failure_propagates() {
        struct BrokenEngine;
        impl AuctionEngine for BrokenEngine {
            fn submit_auction(
                &self,
                _ad_units: Vec<BidRequest>,
                _config: AuctionConfig,
                _handler: BidsBackHandler,
            ) -> Result<()> {
                Err(BidplayError::AuctionEngine("queue closed".to_string()))
            }
        }

        let coord = AuctionCoordinator::new(Arc::new(BrokenEngine));
        let err = coord
            .run_auction(&BidRequest::default_video_unit(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, BidplayError::AuctionEngine(_)));
    }

    #[test]
    fn test_collapse_keeps_highest_bid_per_bidder() {
        let collapsed = collapse_by_bidder(vec![bid("a", 1.0), bid("a", 2.5), bid("b", 0.4)]);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed["a"].cpm, 2.5);
    }

    #[test]
    fn test_handler_completes_once_into_closed_channel() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let handler = BidsBackHandler { tx };
        // Must not panic when the coordinator is gone
        handler.complete(Vec::new(), false, "late");
    }
}
