use crate::ad::engine::{AdsLoader, AdsManager, DisplayContainer, EngineSink, Notification};
use crate::auction::BidResult;
use crate::error::Result;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

pub type SessionId = u64;

/// Everything that can happen to a session after it started
#[derive(Debug)]
pub enum SessionEvent {
    /// The auction closed (or failed to run)
    AuctionClosed(Result<BidResult>),
    Engine(Notification),
    /// Remaining-time poll timer fired
    PollTick,
}

/// A [`SessionEvent`] addressed to one session
#[derive(Debug)]
pub struct TaggedEvent {
    pub session_id: SessionId,
    pub event: SessionEvent,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// All ads played, content resumed
    Completed,
    /// Auction missed its deadline, content played without ads
    AuctionTimedOut,
    /// Auction could not be run or no tag could be built
    AuctionFailed,
    /// Display container or loader could not be set up
    SetupError,
    /// The ad request failed before playback started
    RequestError,
    /// `init` or `start` on the manager failed
    InitError,
    /// The manager reported an error during playback
    PlaybackError,
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::AuctionTimedOut => "auction_timed_out",
            SessionOutcome::AuctionFailed => "auction_failed",
            SessionOutcome::SetupError => "setup_error",
            SessionOutcome::RequestError => "request_error",
            SessionOutcome::InitError => "init_error",
            SessionOutcome::PlaybackError => "playback_error",
        }
    }
}

/// Recurring remaining-time poll, alive only while a linear ad plays
#[derive(Debug)]
pub struct PollTimer {
    task: JoinHandle<()>,
}

impl PollTimer {
    fn start(
        session_id: SessionId,
        period: Duration,
        tx: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let tick = TaggedEvent {
                    session_id,
                    event: SessionEvent::PollTick,
                };
                if tx.send(tick).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    fn cancel(self) {
        self.task.abort();
    }
}

/// Handles owned by one playback attempt
///
/// Holds at most one ads manager and at most one poll timer. Releasing is
/// best-effort and idempotent; dropping the session releases whatever is
/// still held.
pub struct AdSession {
    id: SessionId,
    events: mpsc::UnboundedSender<TaggedEvent>,
    display_container: Option<Box<dyn DisplayContainer>>,
    loader: Option<Box<dyn AdsLoader>>,
    manager: Option<Box<dyn AdsManager>>,
    poll_timer: Option<PollTimer>,
    remaining_time: Option<f64>,
}

impl AdSession {
    pub fn new(id: SessionId, events: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self {
            id,
            events,
            display_container: None,
            loader: None,
            manager: None,
            poll_timer: None,
            remaining_time: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// A sink delivering engine notifications back to this session
    pub fn sink(&self) -> EngineSink {
        EngineSink::new(self.id, self.events.clone())
    }

    pub fn set_display_container(&mut self, container: Box<dyn DisplayContainer>) {
        if let Some(mut old) = self.display_container.replace(container) {
            old.destroy();
        }
    }

    pub fn display_container(&self) -> Option<&dyn DisplayContainer> {
        self.display_container.as_deref()
    }

    pub fn take_display_container(&mut self) -> Option<Box<dyn DisplayContainer>> {
        self.display_container.take()
    }

    pub fn set_loader(&mut self, loader: Box<dyn AdsLoader>) {
        self.loader = Some(loader);
    }

    pub fn loader_mut(&mut self) -> Option<&mut (dyn AdsLoader + 'static)> {
        self.loader.as_deref_mut()
    }

    pub fn take_loader(&mut self) -> Option<Box<dyn AdsLoader>> {
        self.loader.take()
    }

    /// Install a new manager, releasing any stale one first
    pub fn replace_manager(&mut self, manager: Box<dyn AdsManager>) {
        self.release_manager();
        self.manager = Some(manager);
    }

    pub fn manager_mut(&mut self) -> Option<&mut (dyn AdsManager + 'static)> {
        self.manager.as_deref_mut()
    }

    pub fn has_manager(&self) -> bool {
        self.manager.is_some()
    }

    /// Destroy the manager if there is one. A failing `destroy` is logged
    /// and discarded: release runs on error paths and must not replace the
    /// original error or block content playback.
    pub fn release_manager(&mut self) {
        if let Some(mut manager) = self.manager.take()
            && let Err(e) = manager.destroy()
        {
            debug!(session_id = self.id, "Ignoring ad manager destroy failure: {}", e);
        }
    }

    /// Start the poll timer. Returns false if one is already running.
    pub fn start_poll_timer(&mut self, period: Duration) -> bool {
        if self.poll_timer.is_some() {
            return false;
        }
        self.poll_timer = Some(PollTimer::start(self.id, period, self.events.clone()));
        true
    }

    /// Cancel the poll timer. Returns false if none was running.
    pub fn cancel_poll_timer(&mut self) -> bool {
        match self.poll_timer.take() {
            Some(timer) => {
                timer.cancel();
                self.remaining_time = None;
                true
            }
            None => false,
        }
    }

    pub fn poll_timer_active(&self) -> bool {
        self.poll_timer.is_some()
    }

    pub fn remaining_time(&self) -> Option<f64> {
        self.remaining_time
    }

    pub fn set_remaining_time(&mut self, seconds: f64) {
        self.remaining_time = Some(seconds);
    }

    /// Release every handle: timer, manager, loader, container
    pub fn release_all(&mut self) {
        self.cancel_poll_timer();
        self.release_manager();
        self.loader = None;
        if let Some(mut container) = self.display_container.take() {
            container.destroy();
        }
    }
}

impl Drop for AdSession {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for AdSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdSession")
            .field("id", &self.id)
            .field("has_container", &self.display_container.is_some())
            .field("has_loader", &self.loader.is_some())
            .field("has_manager", &self.manager.is_some())
            .field("poll_timer_active", &self.poll_timer.is_some())
            .finish()
    }
}
