use crate::auction::AdTagUrl;
use crate::error::Result;
use crate::session::{SessionEvent, SessionId, TaggedEvent};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Slot size hint sent with an ad request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSize {
    pub width: u32,
    pub height: u32,
}

/// Slot for linear (video) creatives
pub const LINEAR_SLOT: SlotSize = SlotSize {
    width: 640,
    height: 400,
};

/// Slot for non-linear (overlay) creatives
pub const NON_LINEAR_SLOT: SlotSize = SlotSize {
    width: 640,
    height: 150,
};

/// Ad request submitted through an [`AdsLoader`]
#[derive(Debug, Clone, PartialEq)]
pub struct AdsRequest {
    pub tag_url: AdTagUrl,
    pub linear_slot: SlotSize,
    pub non_linear_slot: SlotSize,
}

impl AdsRequest {
    pub fn new(tag_url: AdTagUrl) -> Self {
        Self {
            tag_url,
            linear_slot: LINEAR_SLOT,
            non_linear_slot: NON_LINEAR_SLOT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Normal,
    Fullscreen,
}

/// What the engine tells us about the ad it is playing
#[derive(Debug, Clone, PartialEq)]
pub struct AdDescriptor {
    pub ad_id: String,
    pub is_linear: bool,
}

/// Error reported by the loader or the manager
#[derive(Debug, Clone, PartialEq)]
pub struct AdError {
    pub code: u32,
    pub message: String,
    /// Request context the engine attached, if any
    pub context: Option<String>,
}

impl fmt::Display for AdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, " (context: {})", ctx)?;
        }
        Ok(())
    }
}

/// Events raised by an [`AdsManager`]
#[derive(Debug, Clone, PartialEq)]
pub enum AdEvent {
    Loaded(Option<AdDescriptor>),
    Started(Option<AdDescriptor>),
    Complete(Option<AdDescriptor>),
    AllAdsComplete,
    ContentPauseRequested,
    ContentResumeRequested,
    Error(AdError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdEventKind {
    Error,
    ContentPauseRequested,
    ContentResumeRequested,
    AllAdsComplete,
    Loaded,
    Started,
    Complete,
}

/// Every manager event the lifecycle listens to
pub const MANAGER_EVENTS: [AdEventKind; 7] = [
    AdEventKind::Error,
    AdEventKind::ContentPauseRequested,
    AdEventKind::ContentResumeRequested,
    AdEventKind::AllAdsComplete,
    AdEventKind::Loaded,
    AdEventKind::Started,
    AdEventKind::Complete,
];

impl AdEvent {
    pub fn kind(&self) -> AdEventKind {
        match self {
            AdEvent::Loaded(_) => AdEventKind::Loaded,
            AdEvent::Started(_) => AdEventKind::Started,
            AdEvent::Complete(_) => AdEventKind::Complete,
            AdEvent::AllAdsComplete => AdEventKind::AllAdsComplete,
            AdEvent::ContentPauseRequested => AdEventKind::ContentPauseRequested,
            AdEvent::ContentResumeRequested => AdEventKind::ContentResumeRequested,
            AdEvent::Error(_) => AdEventKind::Error,
        }
    }
}

/// Notification from the ad decision engine
pub enum Notification {
    /// The ad request succeeded and a manager is ready
    ManagerLoaded(Box<dyn AdsManager>),
    /// The loader reported an ad request error
    LoaderError(AdError),
    /// Event from the manager
    Ad(AdEvent),
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::ManagerLoaded(_) => f.write_str("ManagerLoaded"),
            Notification::LoaderError(e) => f.debug_tuple("LoaderError").field(e).finish(),
            Notification::Ad(e) => f.debug_tuple("Ad").field(e).finish(),
        }
    }
}

/// Where engines deliver notifications for one session
///
/// Every notification is tagged with the session it belongs to, so events
/// that outlive their session can be recognised and dropped.
#[derive(Clone, Debug)]
pub struct EngineSink {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EngineSink {
    pub fn new(session_id: SessionId, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn emit(&self, notification: Notification) {
        let event = TaggedEvent {
            session_id: self.session_id,
            event: SessionEvent::Engine(notification),
        };
        if self.tx.send(event).is_err() {
            debug!(session_id = self.session_id, "Orchestrator gone, dropping engine notification");
        }
    }
}

/// Ad decision engine (ad SDK) boundary
pub trait AdDecisionEngine: Send + Sync {
    /// Create the container ads render into, bound to the content element
    fn create_display_container(
        &self,
        container_id: &str,
        content_id: &str,
    ) -> Result<Box<dyn DisplayContainer>>;

    fn create_loader(&self, container: &dyn DisplayContainer) -> Result<Box<dyn AdsLoader>>;
}

pub trait DisplayContainer: Send {
    /// Must run as part of a user action on some platforms
    fn initialize(&mut self) -> Result<()>;

    fn destroy(&mut self);
}

pub trait AdsLoader: Send {
    /// Register the receiver for manager-loaded and ad-error notifications
    fn set_listener(&mut self, sink: EngineSink);

    fn request_ads(&mut self, request: AdsRequest) -> Result<()>;

    /// Content finished playing; the engine may now schedule post-rolls.
    ///
    /// Returns true if a post-roll request is now pending, in which case
    /// the listener will hear a manager-loaded or an ad error for it.
    fn content_complete(&mut self) -> bool;
}

pub trait AdsManager: Send {
    fn subscribe(&mut self, kinds: &[AdEventKind], sink: EngineSink);

    fn init(&mut self, width: u32, height: u32, view_mode: ViewMode) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn destroy(&mut self) -> Result<()>;

    /// Seconds left in the current ad
    fn remaining_time(&self) -> f64;
}
