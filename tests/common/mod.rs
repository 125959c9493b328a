//! Scripted engines and a recording content element shared by the
//! integration tests.
#![allow(dead_code)]

use bidplay::ad::{
    AdDecisionEngine, AdEventKind, AdsLoader, AdsManager, AdsRequest, DisplayContainer,
    EngineSink, Notification, ViewMode,
};
use bidplay::auction::{AuctionConfig, AuctionEngine, Bid, BidRequest, BidsBackHandler};
use bidplay::content::ContentElement;
use bidplay::error::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Auction engine answering after a fixed latency, or never
pub struct ScriptedAuction {
    pub latency: Option<Duration>,
    pub bids: Vec<Bid>,
    pub submissions: AtomicUsize,
}

impl ScriptedAuction {
    pub fn responding(latency: Duration, bids: Vec<Bid>) -> Self {
        Self {
            latency: Some(latency),
            bids,
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            latency: None,
            bids: Vec::new(),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl AuctionEngine for ScriptedAuction {
    fn submit_auction(
        &self,
        _ad_units: Vec<BidRequest>,
        _config: AuctionConfig,
        handler: BidsBackHandler,
    ) -> Result<()> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let bids = self.bids.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            match latency {
                Some(latency) => {
                    tokio::time::sleep(latency).await;
                    handler.complete(bids, false, format!("auction-{}", n));
                }
                None => {
                    let _held = handler;
                    std::future::pending::<()>().await;
                }
            }
        });
        Ok(())
    }
}

pub fn bid(bidder: &str, cpm: f64) -> Bid {
    Bid {
        bidder: bidder.to_string(),
        cpm,
        ad_id: format!("{}-creative", bidder),
        cache_id: Some(format!("{}-cache", bidder)),
        vast_url: None,
        width: 640,
        height: 480,
    }
}

/// What the fake ad engine observed
#[derive(Default)]
pub struct EngineLog {
    pub containers: usize,
    pub requests: Vec<AdsRequest>,
    pub sink: Option<EngineSink>,
    pub inits: usize,
    pub starts: usize,
    pub destroys: usize,
    pub content_completes: usize,
    /// Whether content completion schedules a post-roll
    pub post_roll: bool,
}

pub type SharedLog = Arc<Mutex<EngineLog>>;

/// Ad engine whose events are injected by the test through the captured sink
#[derive(Default, Clone)]
pub struct FakeAdEngine {
    pub log: SharedLog,
}

impl FakeAdEngine {
    /// Deliver a notification as the engine would
    pub fn emit(&self, notification: Notification) {
        let sink = self
            .log
            .lock()
            .unwrap()
            .sink
            .clone()
            .expect("loader listener registered");
        sink.emit(notification);
    }

    pub fn manager(&self) -> Box<dyn AdsManager> {
        Box::new(FakeManager {
            log: self.log.clone(),
        })
    }

    /// Engine that answers content completion with a post-roll request
    pub fn with_post_roll() -> Self {
        let engine = Self::default();
        engine.log.lock().unwrap().post_roll = true;
        engine
    }

    pub fn requests(&self) -> usize {
        self.log.lock().unwrap().requests.len()
    }

    pub fn destroys(&self) -> usize {
        self.log.lock().unwrap().destroys
    }
}

struct FakeContainer;

impl DisplayContainer for FakeContainer {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }
    fn destroy(&mut self) {}
}

struct FakeLoader {
    log: SharedLog,
}

impl AdsLoader for FakeLoader {
    fn set_listener(&mut self, sink: EngineSink) {
        self.log.lock().unwrap().sink = Some(sink);
    }
    fn request_ads(&mut self, request: AdsRequest) -> Result<()> {
        self.log.lock().unwrap().requests.push(request);
        Ok(())
    }
    fn content_complete(&mut self) -> bool {
        let mut log = self.log.lock().unwrap();
        log.content_completes += 1;
        log.post_roll
    }
}

struct FakeManager {
    log: SharedLog,
}

impl AdsManager for FakeManager {
    fn subscribe(&mut self, _kinds: &[AdEventKind], _sink: EngineSink) {}
    fn init(&mut self, _width: u32, _height: u32, _view_mode: ViewMode) -> Result<()> {
        self.log.lock().unwrap().inits += 1;
        Ok(())
    }
    fn start(&mut self) -> Result<()> {
        self.log.lock().unwrap().starts += 1;
        Ok(())
    }
    fn destroy(&mut self) -> Result<()> {
        self.log.lock().unwrap().destroys += 1;
        Ok(())
    }
    fn remaining_time(&self) -> f64 {
        4.0
    }
}

impl AdDecisionEngine for FakeAdEngine {
    fn create_display_container(
        &self,
        _container_id: &str,
        _content_id: &str,
    ) -> Result<Box<dyn DisplayContainer>> {
        self.log.lock().unwrap().containers += 1;
        Ok(Box::new(FakeContainer))
    }

    fn create_loader(&self, _container: &dyn DisplayContainer) -> Result<Box<dyn AdsLoader>> {
        Ok(Box::new(FakeLoader {
            log: self.log.clone(),
        }))
    }
}

/// Content element recording every call it receives
#[derive(Default, Clone)]
pub struct RecordingContent {
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingContent {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn plays(&self) -> usize {
        self.calls().iter().filter(|c| **c == "play").count()
    }
}

impl ContentElement for RecordingContent {
    fn id(&self) -> &str {
        "contentElement"
    }
    fn load(&mut self) {
        self.calls.lock().unwrap().push("load");
    }
    fn play(&mut self) {
        self.calls.lock().unwrap().push("play");
    }
    fn pause(&mut self) {
        self.calls.lock().unwrap().push("pause");
    }
}
