//! Playback engine adapter
//!
//! Capability interface over the third-party player widget. The loop
//! controller only ever talks to an engine through these traits, so any
//! player (embedded web widget, native decoder, the simulated engine) can
//! back it.
//!
//! Notifications are asynchronous: the engine calls back into its
//! [`EngineNotifier`] from whatever context it likes, and the controller
//! processes them on its own task in arrival order.

use thiserror::Error;
use tokio::sync::mpsc;

use super::controller::LoopInput;
use crate::model::TrackId;

/// Errors reported by an engine instance
///
/// All of these are transient from the controller's point of view.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Command issued before the instance signalled readiness
    #[error("engine instance not ready")]
    NotReady,

    /// Command issued to a destroyed instance
    #[error("engine instance destroyed")]
    Destroyed,

    /// The UI container the player mounts into does not exist (yet)
    #[error("mount point '{0}' not found")]
    MountMissing(String),

    /// Any other command failure
    #[error("engine command failed: {0}")]
    Command(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Player state codes carried by state-change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlayerState {
    /// Numeric code as reported by the widget
    pub fn code(self) -> i32 {
        match self {
            PlayerState::Unstarted => -1,
            PlayerState::Ended => 0,
            PlayerState::Playing => 1,
            PlayerState::Paused => 2,
            PlayerState::Buffering => 3,
            PlayerState::Cued => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(PlayerState::Unstarted),
            0 => Some(PlayerState::Ended),
            1 => Some(PlayerState::Playing),
            2 => Some(PlayerState::Paused),
            3 => Some(PlayerState::Buffering),
            5 => Some(PlayerState::Cued),
            _ => None,
        }
    }
}

/// Construction parameters for one engine instance
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    pub video_id: String,
    /// Start playing as soon as the clip is loaded
    pub autoplay: bool,
    /// Start muted
    pub muted: bool,
    /// Initial position, whole seconds
    pub start_seconds: u32,
    /// Show the widget's own controls
    pub controls: bool,
    /// Widget-native looping (the controller loops, so this stays off)
    pub native_loop: bool,
    /// Show related clips at the end
    pub related: bool,
    pub modest_branding: bool,
    /// Enable the scripting API the adapter relies on
    pub js_api: bool,
}

impl PlayerOptions {
    /// Options used by the loop controller for a clip
    pub fn for_clip(video_id: &str, autoplay: bool, muted: bool, start_time: f64) -> Self {
        Self {
            video_id: video_id.to_string(),
            autoplay,
            muted,
            start_seconds: start_time.max(0.0).floor() as u32,
            controls: false,
            native_loop: false,
            related: false,
            modest_branding: true,
            js_api: true,
        }
    }
}

/// Asynchronous notification from an engine instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineNotification {
    /// Instance finished initializing; commands are accepted from now on
    Ready,
    /// Player state changed (raw code, see [`PlayerState`])
    StateChanged(i32),
}

/// Callback handle given to an engine instance at construction
///
/// Each notification is tagged with the instance it came from so the
/// controller can drop notifications from an instance it already destroyed.
#[derive(Debug, Clone)]
pub struct EngineNotifier {
    track_id: TrackId,
    instance: u64,
    tx: mpsc::UnboundedSender<LoopInput>,
}

impl EngineNotifier {
    pub(crate) fn new(track_id: TrackId, instance: u64, tx: mpsc::UnboundedSender<LoopInput>) -> Self {
        Self { track_id, instance, tx }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Fire the readiness notification
    pub fn ready(&self) {
        self.send(EngineNotification::Ready);
    }

    /// Fire a state-change notification
    pub fn state_changed(&self, state: PlayerState) {
        self.send(EngineNotification::StateChanged(state.code()));
    }

    /// Fire a state-change notification with a raw code
    pub fn state_code(&self, code: i32) {
        self.send(EngineNotification::StateChanged(code));
    }

    fn send(&self, notification: EngineNotification) {
        // Controller gone means nobody cares anymore
        let _ = self.tx.send(LoopInput::Notification {
            instance: self.instance,
            notification,
        });
    }
}

/// One player instance bound to one mount point
pub trait PlaybackEngine: Send {
    fn play(&mut self) -> EngineResult<()>;
    fn pause(&mut self) -> EngineResult<()>;
    fn seek(&mut self, seconds: f64, allow_seek_ahead: bool) -> EngineResult<()>;
    /// 0-100
    fn set_volume(&mut self, volume: u8) -> EngineResult<()>;
    fn mute(&mut self) -> EngineResult<()>;
    fn unmute(&mut self) -> EngineResult<()>;
    /// Current position in seconds
    fn current_time(&self) -> EngineResult<f64>;
    /// Clip length in seconds (meaningful once ready)
    fn duration(&self) -> EngineResult<f64>;
    fn destroy(&mut self) -> EngineResult<()>;
}

/// Creates engine instances
pub trait EngineFactory: Send + Sync {
    /// Construct a player in `mount_id`
    ///
    /// Returns [`EngineError::MountMissing`] if the mount point does not exist.
    fn create(
        &self,
        mount_id: &str,
        options: PlayerOptions,
        notifier: EngineNotifier,
    ) -> EngineResult<Box<dyn PlaybackEngine>>;
}

/// Mount point identifier for a track slot
pub fn mount_id(track_id: TrackId) -> String {
    format!("loopmix-track-{}", track_id)
}
