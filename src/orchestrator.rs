//! Ties the auction, the ad lifecycle and content playback together.
//!
//! All session state lives in [`Orchestrator`] and is only touched from its
//! event loop. Auctions and poll timers run as tasks that report back
//! through the loop's channel, so no two handlers ever interleave.

use crate::ad::{AdDecisionEngine, AdLifecycle, AdState, Flow, LifecycleSettings, Notification};
use crate::auction::{AuctionCoordinator, BidRequest, BidResult, TagParams, build_video_url};
use crate::config::Config;
use crate::content::{ContentController, PlaybackState};
use crate::error::{BidplayError, Result};
use crate::metrics;
use crate::session::{AdSession, SessionEvent, SessionId, SessionOutcome, TaggedEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Capacity of the command queue between handles and the loop
const COMMAND_QUEUE: usize = 32;

/// What the orchestrator needs from the configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub auction_timeout: Duration,
    pub ad_unit: BidRequest,
    pub tag_params: TagParams,
    pub lifecycle: LifecycleSettings,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            auction_timeout: config.auction_timeout,
            ad_unit: config.ad_unit.clone(),
            tag_params: config.tag_params.clone(),
            lifecycle: config.lifecycle_settings(),
        }
    }
}

/// Point-in-time view of the orchestrator, for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub session_id: Option<SessionId>,
    /// Ad lifecycle state of the in-flight session
    pub ad_state: Option<AdState>,
    pub content: PlaybackState,
    pub ad_remaining_secs: Option<f64>,
    pub sessions_started: u64,
    pub last_outcome: Option<SessionOutcome>,
}

enum Command {
    Play(oneshot::Sender<Result<SessionId>>),
    ContentEnded,
    Status(oneshot::Sender<StatusSnapshot>),
    Shutdown,
}

/// Cloneable handle for talking to a running [`Orchestrator`]
#[derive(Clone, Debug)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    /// The user's play action. Fails with `SessionInFlight` while a session
    /// is still running.
    pub async fn play(&self) -> Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Play(reply)).await?;
        rx.await.map_err(|_| BidplayError::OrchestratorStopped)?
    }

    /// The content element reached its end
    pub async fn content_ended(&self) -> Result<()> {
        self.send(Command::ContentEnded).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status(reply)).await?;
        rx.await.map_err(|_| BidplayError::OrchestratorStopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BidplayError::OrchestratorStopped)
    }
}

/// Runs playback sessions: auction, ad tag, ads, content
pub struct Orchestrator {
    settings: OrchestratorSettings,
    coordinator: AuctionCoordinator,
    ad_engine: Arc<dyn AdDecisionEngine>,
    content: ContentController,
    /// The in-flight session; at most one
    current: Option<AdLifecycle>,
    /// Last completed session, stripped of its manager. Its loader and
    /// container are reused for a post-roll when content ends.
    retained: Option<AdSession>,
    next_session_id: SessionId,
    last_outcome: Option<SessionOutcome>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    commands_rx: mpsc::Receiver<Command>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        coordinator: AuctionCoordinator,
        ad_engine: Arc<dyn AdDecisionEngine>,
        content: ContentController,
    ) -> (Self, OrchestratorHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);

        let orchestrator = Self {
            settings,
            coordinator,
            ad_engine,
            content,
            current: None,
            retained: None,
            next_session_id: 1,
            last_outcome: None,
            events_tx,
            events_rx,
            commands_rx,
        };
        (orchestrator, OrchestratorHandle { tx: commands_tx })
    }

    /// Process commands and session events until shut down or every
    /// handle is dropped
    pub async fn run(mut self) {
        info!("Orchestrator running");
        loop {
            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(Command::Play(reply)) => {
                        let _ = reply.send(self.play());
                    }
                    Some(Command::ContentEnded) => self.content_ended(),
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        if let Some(lifecycle) = self.current.take() {
            info!(session_id = lifecycle.session_id(), "Shutting down with a session in flight");
        }
        info!("Orchestrator stopped");
    }

    /// Start a session: load content and submit the auction.
    ///
    /// Rejected while another session is in flight; requests are not queued.
    pub fn play(&mut self) -> Result<SessionId> {
        if let Some(lifecycle) = &self.current {
            metrics::record_play_rejected();
            warn!(
                session_id = lifecycle.session_id(),
                "Play requested while a session is in flight, ignoring"
            );
            return Err(BidplayError::SessionInFlight(lifecycle.session_id()));
        }

        // The previous session is fully released before the next one starts
        self.retained = None;

        let session_id = self.allocate_session_id();

        let session = AdSession::new(session_id, self.events_tx.clone());
        self.current = Some(AdLifecycle::new(session, self.settings.lifecycle.clone()));
        metrics::set_active_session(true);

        self.content.load();

        let coordinator = self.coordinator.clone();
        let ad_unit = self.settings.ad_unit.clone();
        let timeout = self.settings.auction_timeout;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = coordinator.run_auction(&ad_unit, timeout).await;
            let closed = TaggedEvent {
                session_id,
                event: SessionEvent::AuctionClosed(result),
            };
            if tx.send(closed).is_err() {
                debug!(session_id, "Orchestrator gone before the auction closed");
            }
        });

        info!(session_id, "Playback session started");
        Ok(session_id)
    }

    /// Content reached its end: let the ad engine schedule post-rolls, once
    pub fn content_ended(&mut self) {
        if !self.content.content_ended() {
            return;
        }
        if let Some(lifecycle) = self.current.as_mut() {
            info!(session_id = lifecycle.session_id(), "Content ended, notifying ads loader");
            lifecycle.content_complete();
        } else if let Some(previous) = self.retained.take() {
            self.open_post_roll_session(previous);
        } else {
            debug!("Content ended with no ads loader to notify");
        }
    }

    /// Move the loader and container of a completed session into a new
    /// session, so the post-roll answer reaches a live lifecycle
    fn open_post_roll_session(&mut self, mut previous: AdSession) {
        let Some(mut loader) = previous.take_loader() else {
            debug!(session_id = previous.id(), "Content ended, last session kept no loader");
            return;
        };

        let session_id = self.allocate_session_id();
        let mut session = AdSession::new(session_id, self.events_tx.clone());
        if let Some(container) = previous.take_display_container() {
            session.set_display_container(container);
        }
        loader.set_listener(session.sink());

        info!(
            session_id,
            previous_session_id = previous.id(),
            "Content ended, notifying ads loader"
        );
        if !loader.content_complete() {
            debug!(session_id, "No post-roll scheduled");
            return;
        }

        session.set_loader(loader);
        let lifecycle = AdLifecycle::awaiting_post_roll(session, self.settings.lifecycle.clone());
        self.current = Some(lifecycle);
        metrics::set_active_session(true);
        info!(session_id, "Post-roll session started");
    }

    fn allocate_session_id(&mut self) -> SessionId {
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        session_id
    }

    /// Wait for the next session event. Used to drive the orchestrator
    /// step by step without [`Orchestrator::run`].
    pub async fn next_event(&mut self) -> Option<TaggedEvent> {
        self.events_rx.recv().await
    }

    /// Take the next session event if one is already queued
    pub fn try_next_event(&mut self) -> Option<TaggedEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Apply one session event
    pub fn handle_event(&mut self, tagged: TaggedEvent) {
        let TaggedEvent { session_id, event } = tagged;

        let Some(lifecycle) = self.current.as_mut().filter(|l| l.session_id() == session_id) else {
            debug!(session_id, "Discarding event for a session that is no longer active");
            if let SessionEvent::Engine(Notification::ManagerLoaded(mut manager)) = event
                && let Err(e) = manager.destroy()
            {
                debug!(session_id, "Ignoring destroy failure on stale manager: {}", e);
            }
            return;
        };

        let flow = match event {
            SessionEvent::AuctionClosed(result) => self.on_auction_closed(session_id, result),
            SessionEvent::Engine(notification) => {
                match lifecycle.on_notification(notification, &mut self.content) {
                    Ok(flow) => flow,
                    Err(e) => {
                        warn!(session_id, "Ignoring ad event: {}", e);
                        Flow::Continue
                    }
                }
            }
            SessionEvent::PollTick => {
                lifecycle.on_poll_tick();
                Flow::Continue
            }
        };

        if let Flow::Finished(outcome) = flow {
            self.finish(outcome);
        }
    }

    fn on_auction_closed(&mut self, session_id: SessionId, result: Result<BidResult>) -> Flow {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                error!(session_id, "Auction could not run: {}", e);
                self.content.play();
                return Flow::Finished(SessionOutcome::AuctionFailed);
            }
        };

        if result.is_timed_out() {
            info!(
                session_id,
                auction_id = result.auction_id(),
                "Auction timed out, playing content without ads"
            );
            self.content.play();
            return Flow::Finished(SessionOutcome::AuctionTimedOut);
        }

        let tag_url = match build_video_url(
            &self.settings.ad_unit,
            &self.settings.tag_params,
            &result,
        ) {
            Ok(url) => url,
            Err(e) => {
                error!(session_id, "Failed to build ad tag: {}", e);
                self.content.play();
                return Flow::Finished(SessionOutcome::AuctionFailed);
            }
        };

        let Some(lifecycle) = self.current.as_mut() else {
            return Flow::Continue;
        };
        match lifecycle.begin(self.ad_engine.as_ref(), tag_url, &mut self.content) {
            Ok(flow) => flow,
            Err(e) => {
                warn!(session_id, "Ignoring auction result: {}", e);
                Flow::Continue
            }
        }
    }

    /// Tear down the in-flight session and record how it ended
    fn finish(&mut self, outcome: SessionOutcome) {
        let Some(lifecycle) = self.current.take() else {
            return;
        };
        let mut session = lifecycle.into_session();
        let session_id = session.id();

        if outcome == SessionOutcome::Completed {
            session.cancel_poll_timer();
            session.release_manager();
            self.retained = Some(session);
        } else {
            session.release_all();
        }

        metrics::record_session(outcome.label());
        metrics::set_active_session(false);
        self.last_outcome = Some(outcome);
        info!(session_id, outcome = outcome.label(), "Playback session finished");
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            session_id: self.current.as_ref().map(|l| l.session_id()),
            ad_state: self.current.as_ref().map(|l| l.state()),
            content: self.content.state(),
            ad_remaining_secs: self.current.as_ref().and_then(|l| l.session().remaining_time()),
            sessions_started: self.next_session_id - 1,
            last_outcome: self.last_outcome,
        }
    }

    pub fn content(&self) -> &ContentController {
        &self.content
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }
}
