use crate::ad::engine::{
    AdDecisionEngine, AdDescriptor, AdError, AdEvent, AdsManager, AdsRequest, MANAGER_EVENTS,
    Notification, ViewMode,
};
use crate::auction::AdTagUrl;
use crate::content::ContentController;
use crate::metrics;
use crate::session::{AdSession, SessionId, SessionOutcome};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Where a session is in the ad lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdState {
    /// Waiting for an ad tag (auction still running)
    Idle,
    ContainerReady,
    /// Ad request submitted, waiting for the manager
    Loading,
    ManagerReady,
    Initializing,
    Playing,
    Completed,
    RequestError,
    /// Setup, init or mid-playback failure
    Error,
}

impl AdState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AdState::Completed | AdState::RequestError | AdState::Error)
    }
}

/// Result of handling one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished(SessionOutcome),
}

#[derive(Error, Debug, PartialEq)]
pub enum LifecycleError {
    #[error("illegal transition: {event} while {state:?}")]
    IllegalTransition { state: AdState, event: &'static str },
}

/// Fixed parameters for every session
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    pub container_id: String,
    pub width: u32,
    pub height: u32,
    pub view_mode: ViewMode,
    pub poll_interval: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            container_id: "adContainer".to_string(),
            width: 640,
            height: 360,
            view_mode: ViewMode::Normal,
            poll_interval: Duration::from_millis(300),
        }
    }
}

/// Per-ad ordering: Loaded, then Started, then Complete
#[derive(Debug, Default)]
struct AdProgress {
    loaded: bool,
    started: bool,
}

/// Drives one session from ad tag to content playback.
///
/// Owns the session handles. The content controller is lent to each
/// handler, so content can only be touched at the transitions below.
pub struct AdLifecycle {
    session: AdSession,
    state: AdState,
    settings: LifecycleSettings,
    progress: AdProgress,
}

impl AdLifecycle {
    pub fn new(session: AdSession, settings: LifecycleSettings) -> Self {
        Self {
            session,
            state: AdState::Idle,
            settings,
            progress: AdProgress::default(),
        }
    }

    /// Lifecycle for a post-roll request already in flight on a reused
    /// loader: starts in Loading, waiting for the engine's answer
    pub fn awaiting_post_roll(session: AdSession, settings: LifecycleSettings) -> Self {
        Self {
            session,
            state: AdState::Loading,
            settings,
            progress: AdProgress::default(),
        }
    }

    pub fn state(&self) -> AdState {
        self.state
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn session(&self) -> &AdSession {
        &self.session
    }

    pub fn into_session(self) -> AdSession {
        self.session
    }

    /// Idle → ContainerReady → Loading
    pub fn begin(
        &mut self,
        engine: &dyn AdDecisionEngine,
        tag_url: AdTagUrl,
        content: &mut ContentController,
    ) -> Result<Flow, LifecycleError> {
        self.expect(AdState::Idle, "begin")?;
        let session_id = self.session.id();

        let container = engine
            .create_display_container(&self.settings.container_id, content.element_id())
            .and_then(|mut container| container.initialize().map(|_| container));
        let container = match container {
            Ok(container) => container,
            Err(e) => {
                error!(session_id, "Failed to create ad display container: {}", e);
                metrics::record_ad_error("container");
                return Ok(self.fall_back(AdState::Error, SessionOutcome::SetupError, content));
            }
        };
        self.state = AdState::ContainerReady;

        let loader = engine.create_loader(container.as_ref());
        self.session.set_display_container(container);
        let mut loader = match loader {
            Ok(loader) => loader,
            Err(e) => {
                error!(session_id, "Failed to create ads loader: {}", e);
                metrics::record_ad_error("loader");
                return Ok(self.fall_back(AdState::Error, SessionOutcome::SetupError, content));
            }
        };
        loader.set_listener(self.session.sink());

        info!(session_id, tag_url = %tag_url, "Requesting ads");
        let requested = loader.request_ads(AdsRequest::new(tag_url));
        self.session.set_loader(loader);
        if let Err(e) = requested {
            warn!(session_id, "Ad request rejected: {}", e);
            metrics::record_ad_error("loader");
            return Ok(self.fall_back(
                AdState::RequestError,
                SessionOutcome::RequestError,
                content,
            ));
        }

        self.state = AdState::Loading;
        Ok(Flow::Continue)
    }

    /// Handle a notification from the ad decision engine
    pub fn on_notification(
        &mut self,
        notification: Notification,
        content: &mut ContentController,
    ) -> Result<Flow, LifecycleError> {
        match notification {
            Notification::ManagerLoaded(manager) => self.on_manager_loaded(manager, content),
            Notification::LoaderError(e) => self.on_loader_error(e, content),
            Notification::Ad(event) => self.on_ad_event(event, content),
        }
    }

    /// Poll timer tick: sample the remaining time of the playing ad
    pub fn on_poll_tick(&mut self) {
        if !self.session.poll_timer_active() {
            return;
        }
        if let Some(manager) = self.session.manager_mut() {
            let remaining = manager.remaining_time();
            self.session.set_remaining_time(remaining);
            debug!(session_id = self.session.id(), remaining, "Ad time remaining");
        }
    }

    /// Forward content completion to the loader so it can schedule post-rolls.
    /// Returns true if the engine will answer with a post-roll.
    pub fn content_complete(&mut self) -> bool {
        self.session
            .loader_mut()
            .is_some_and(|loader| loader.content_complete())
    }

    /// Loading → ManagerReady → Initializing → Playing
    fn on_manager_loaded(
        &mut self,
        mut manager: Box<dyn AdsManager>,
        content: &mut ContentController,
    ) -> Result<Flow, LifecycleError> {
        if self.state != AdState::Loading {
            if let Err(e) = manager.destroy() {
                debug!(
                    session_id = self.session.id(),
                    "Ignoring destroy failure on unexpected manager: {}", e
                );
            }
            return Err(self.illegal("manager_loaded"));
        }

        let session_id = self.session.id();
        manager.subscribe(&MANAGER_EVENTS, self.session.sink());
        self.state = AdState::ManagerReady;
        debug!(session_id, "Ads manager loaded");

        self.state = AdState::Initializing;
        let settings = &self.settings;
        let started = manager
            .init(settings.width, settings.height, settings.view_mode)
            .and_then(|_| manager.start());
        self.session.replace_manager(manager);

        match started {
            Ok(()) => {
                self.state = AdState::Playing;
                info!(session_id, "Ad playback started");
                Ok(Flow::Continue)
            }
            Err(e) => {
                // Usually a bad VAST response; content plays instead
                warn!(session_id, "Ads manager failed to start: {}", e);
                metrics::record_ad_error("init");
                Ok(self.fall_back(AdState::Error, SessionOutcome::InitError, content))
            }
        }
    }

    fn on_loader_error(
        &mut self,
        e: AdError,
        content: &mut ContentController,
    ) -> Result<Flow, LifecycleError> {
        match self.state {
            AdState::Loading | AdState::ManagerReady | AdState::Initializing => {
                self.log_ad_error("loader", &e);
                Ok(self.fall_back(
                    AdState::RequestError,
                    SessionOutcome::RequestError,
                    content,
                ))
            }
            AdState::Playing => {
                self.log_ad_error("loader", &e);
                Ok(self.fall_back(AdState::Error, SessionOutcome::PlaybackError, content))
            }
            _ => Err(self.illegal("loader_error")),
        }
    }

    fn on_ad_event(
        &mut self,
        event: AdEvent,
        content: &mut ContentController,
    ) -> Result<Flow, LifecycleError> {
        let session_id = self.session.id();

        match event {
            AdEvent::Error(e) => {
                if self.state.is_terminal() || self.state == AdState::Idle {
                    return Err(self.illegal("ad_error"));
                }
                self.log_ad_error("manager", &e);
                return Ok(self.fall_back(AdState::Error, SessionOutcome::PlaybackError, content));
            }
            // Everything else only makes sense while the manager plays
            other if self.state != AdState::Playing => {
                return Err(self.illegal(event_name(&other)));
            }
            AdEvent::ContentPauseRequested => {
                content.pause();
            }
            AdEvent::ContentResumeRequested => {
                content.play();
            }
            AdEvent::Loaded(ad) => {
                self.progress = AdProgress {
                    loaded: true,
                    started: false,
                };
                // Overlays run on top of content
                if is_non_linear(&ad) {
                    debug!(session_id, "Non-linear ad loaded, resuming content");
                    content.play();
                }
            }
            AdEvent::Started(ad) => {
                if !self.progress.loaded {
                    return Err(self.illegal("started"));
                }
                self.progress.started = true;
                if is_linear(&ad) && !self.session.start_poll_timer(self.settings.poll_interval) {
                    warn!(session_id, "Poll timer already running");
                }
            }
            AdEvent::Complete(ad) => {
                if !self.progress.started {
                    return Err(self.illegal("complete"));
                }
                self.progress = AdProgress::default();
                if is_linear(&ad) {
                    self.session.cancel_poll_timer();
                }
            }
            AdEvent::AllAdsComplete => {
                self.session.cancel_poll_timer();
                self.session.release_manager();
                content.play();
                self.state = AdState::Completed;
                info!(session_id, "All ads complete");
                return Ok(Flow::Finished(SessionOutcome::Completed));
            }
        }

        Ok(Flow::Continue)
    }

    /// Terminal failure: release the timer and the manager, then play content
    fn fall_back(
        &mut self,
        state: AdState,
        outcome: SessionOutcome,
        content: &mut ContentController,
    ) -> Flow {
        self.session.cancel_poll_timer();
        self.session.release_manager();
        content.play();
        self.state = state;
        Flow::Finished(outcome)
    }

    fn log_ad_error(&self, source: &'static str, e: &AdError) {
        warn!(
            session_id = self.session.id(),
            source,
            code = e.code,
            context = e.context.as_deref().unwrap_or(""),
            "Ad error occurred: {}",
            e.message
        );
        metrics::record_ad_error(source);
    }

    fn expect(&self, state: AdState, event: &'static str) -> Result<(), LifecycleError> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.illegal(event))
        }
    }

    fn illegal(&self, event: &'static str) -> LifecycleError {
        LifecycleError::IllegalTransition {
            state: self.state,
            event,
        }
    }
}

fn is_linear(ad: &Option<AdDescriptor>) -> bool {
    ad.as_ref().is_some_and(|a| a.is_linear)
}

fn is_non_linear(ad: &Option<AdDescriptor>) -> bool {
    ad.as_ref().is_some_and(|a| !a.is_linear)
}

fn event_name(event: &AdEvent) -> &'static str {
    match event {
        AdEvent::Loaded(_) => "loaded",
        AdEvent::Started(_) => "started",
        AdEvent::Complete(_) => "complete",
        AdEvent::AllAdsComplete => "all_ads_complete",
        AdEvent::ContentPauseRequested => "content_pause_requested",
        AdEvent::ContentResumeRequested => "content_resume_requested",
        AdEvent::Error(_) => "ad_error",
    }
}

impl std::fmt::Debug for AdLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdLifecycle")
            .field("session", &self.session)
            .field("state", &self.state)
            .finish()
    }
}
