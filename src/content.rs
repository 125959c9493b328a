use serde::Serialize;
use tracing::{debug, info};

/// The primary video element
pub trait ContentElement: Send {
    fn id(&self) -> &str;

    /// (Re)initialise the media source
    fn load(&mut self);

    fn play(&mut self);

    fn pause(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Loaded, never played
    Idle,
    Playing,
    Paused,
    Ended,
}

/// Owns play/pause of the content element
///
/// `play` and `pause` only reach the element when they change the playback
/// state, so repeated calls from different event handlers are harmless.
pub struct ContentController {
    element: Box<dyn ContentElement>,
    state: PlaybackState,
    plays_started: u64,
    ended_signalled: bool,
}

impl ContentController {
    pub fn new(element: Box<dyn ContentElement>) -> Self {
        Self {
            element,
            state: PlaybackState::Idle,
            plays_started: 0,
            ended_signalled: false,
        }
    }

    pub fn element_id(&self) -> &str {
        self.element.id()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Number of times content actually went from not-playing to playing
    pub fn plays_started(&self) -> u64 {
        self.plays_started
    }

    pub fn load(&mut self) {
        self.element.load();
        self.state = PlaybackState::Idle;
        self.ended_signalled = false;
    }

    /// Returns true if this call started playback.
    ///
    /// Ended content stays ended until the next `load`, so a post-roll
    /// resuming content does not restart it.
    pub fn play(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing => {
                debug!(element = self.element.id(), "Content already playing");
                return false;
            }
            PlaybackState::Ended => {
                debug!(element = self.element.id(), "Content ended, not restarting");
                return false;
            }
            PlaybackState::Idle | PlaybackState::Paused => {}
        }
        self.element.play();
        self.state = PlaybackState::Playing;
        self.plays_started += 1;
        true
    }

    /// Returns true if this call paused playback
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        self.element.pause();
        self.state = PlaybackState::Paused;
        true
    }

    /// Record that content reached its end.
    ///
    /// Returns true only the first time per loaded source, so the ad engine
    /// hears about it once.
    pub fn content_ended(&mut self) -> bool {
        if self.ended_signalled {
            return false;
        }
        self.ended_signalled = true;
        self.state = PlaybackState::Ended;
        true
    }
}

impl std::fmt::Debug for ContentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentController")
            .field("element", &self.element.id())
            .field("state", &self.state)
            .field("plays_started", &self.plays_started)
            .finish()
    }
}

/// Content element without a screen: logs what a real player would do
#[derive(Debug, Clone)]
pub struct HeadlessContent {
    id: String,
}

impl HeadlessContent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ContentElement for HeadlessContent {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&mut self) {
        info!(element = %self.id, "Content: load");
    }

    fn play(&mut self) {
        info!(element = %self.id, "Content: play");
    }

    fn pause(&mut self) {
        info!(element = %self.id, "Content: pause");
    }
}
