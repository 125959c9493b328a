use crate::ad::engine::{
    AdDecisionEngine, AdDescriptor, AdError, AdEvent, AdEventKind, AdsLoader, AdsManager,
    AdsRequest, DisplayContainer, EngineSink, Notification, ViewMode,
};
use crate::error::{BidplayError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// VAST error code for an empty response
const VAST_EMPTY_RESPONSE: u32 = 1009;

/// The single ad a [`StaticAdEngine`] serves
#[derive(Debug, Clone, PartialEq)]
pub struct StaticAd {
    pub ad_id: String,
    pub duration: Duration,
    pub is_linear: bool,
}

impl StaticAd {
    fn descriptor(&self) -> AdDescriptor {
        AdDescriptor {
            ad_id: self.ad_id.clone(),
            is_linear: self.is_linear,
        }
    }
}

/// In-process ad decision engine that serves one fixed ad for any tag
///
/// Plays the ad on a timer instead of rendering it: a linear ad pauses
/// content, runs for its duration and resumes content; a non-linear ad
/// runs alongside content. Can be configured to answer every request with
/// an empty-response error instead.
#[derive(Debug, Clone)]
pub struct StaticAdEngine {
    ad: StaticAd,
    fail_requests: bool,
}

impl StaticAdEngine {
    pub fn new(ad: StaticAd) -> Self {
        Self {
            ad,
            fail_requests: false,
        }
    }

    /// Engine whose ad requests always fail
    pub fn failing(ad: StaticAd) -> Self {
        Self {
            ad,
            fail_requests: true,
        }
    }
}

impl AdDecisionEngine for StaticAdEngine {
    fn create_display_container(
        &self,
        container_id: &str,
        content_id: &str,
    ) -> Result<Box<dyn DisplayContainer>> {
        debug!(container_id, content_id, "Creating display container");
        Ok(Box::new(StaticContainer {
            container_id: container_id.to_string(),
            initialized: false,
        }))
    }

    fn create_loader(&self, _container: &dyn DisplayContainer) -> Result<Box<dyn AdsLoader>> {
        Ok(Box::new(StaticLoader {
            ad: self.ad.clone(),
            fail_requests: self.fail_requests,
            listener: None,
        }))
    }
}

struct StaticContainer {
    container_id: String,
    initialized: bool,
}

impl DisplayContainer for StaticContainer {
    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn destroy(&mut self) {
        debug!(
            container_id = %self.container_id,
            initialized = self.initialized,
            "Display container destroyed"
        );
    }
}

struct StaticLoader {
    ad: StaticAd,
    fail_requests: bool,
    listener: Option<EngineSink>,
}

impl AdsLoader for StaticLoader {
    fn set_listener(&mut self, sink: EngineSink) {
        self.listener = Some(sink);
    }

    fn request_ads(&mut self, request: AdsRequest) -> Result<()> {
        let Some(sink) = &self.listener else {
            return Err(BidplayError::AdEngine(
                "ad request submitted before a listener was registered".to_string(),
            ));
        };

        if self.fail_requests {
            sink.emit(Notification::LoaderError(AdError {
                code: VAST_EMPTY_RESPONSE,
                message: "The VAST response document is empty.".to_string(),
                context: Some(request.tag_url.to_string()),
            }));
        } else {
            sink.emit(Notification::ManagerLoaded(Box::new(StaticManager::new(
                self.ad.clone(),
            ))));
        }
        Ok(())
    }

    fn content_complete(&mut self) -> bool {
        info!("Content complete, no post-roll scheduled");
        false
    }
}

struct StaticManager {
    ad: StaticAd,
    subscribed: Vec<AdEventKind>,
    sink: Option<EngineSink>,
    initialized: bool,
    started_at: Option<Instant>,
    timeline: Option<JoinHandle<()>>,
}

impl StaticManager {
    fn new(ad: StaticAd) -> Self {
        Self {
            ad,
            subscribed: Vec::new(),
            sink: None,
            initialized: false,
            started_at: None,
            timeline: None,
        }
    }
}

/// Emit only the events the lifecycle subscribed to
fn emit(sink: &EngineSink, subscribed: &[AdEventKind], event: AdEvent) {
    if subscribed.contains(&event.kind()) {
        sink.emit(Notification::Ad(event));
    }
}

impl AdsManager for StaticManager {
    fn subscribe(&mut self, kinds: &[AdEventKind], sink: EngineSink) {
        self.subscribed = kinds.to_vec();
        self.sink = Some(sink);
    }

    fn init(&mut self, width: u32, height: u32, view_mode: ViewMode) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BidplayError::AdEngine(format!(
                "invalid ad size {}x{}",
                width, height
            )));
        }
        debug!(width, height, ?view_mode, "Ads manager initialised");
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(BidplayError::AdEngine("start called before init".to_string()));
        }
        let Some(sink) = self.sink.clone() else {
            return Err(BidplayError::AdEngine("no event listener registered".to_string()));
        };

        let ad = self.ad.clone();
        let subscribed = self.subscribed.clone();
        self.started_at = Some(Instant::now());
        self.timeline = Some(tokio::spawn(async move {
            let descriptor = ad.descriptor();
            if ad.is_linear {
                emit(&sink, &subscribed, AdEvent::ContentPauseRequested);
            }
            emit(&sink, &subscribed, AdEvent::Loaded(Some(descriptor.clone())));
            emit(&sink, &subscribed, AdEvent::Started(Some(descriptor.clone())));
            tokio::time::sleep(ad.duration).await;
            emit(&sink, &subscribed, AdEvent::Complete(Some(descriptor)));
            if ad.is_linear {
                emit(&sink, &subscribed, AdEvent::ContentResumeRequested);
            }
            emit(&sink, &subscribed, AdEvent::AllAdsComplete);
        }));
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if let Some(timeline) = self.timeline.take() {
            timeline.abort();
        }
        Ok(())
    }

    fn remaining_time(&self) -> f64 {
        match self.started_at {
            Some(started) => self
                .ad
                .duration
                .saturating_sub(started.elapsed())
                .as_secs_f64(),
            None => self.ad.duration.as_secs_f64(),
        }
    }
}

impl Drop for StaticManager {
    fn drop(&mut self) {
        if let Some(timeline) = self.timeline.take() {
            timeline.abort();
        }
    }
}
