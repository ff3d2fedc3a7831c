//! Track model
//!
//! Pure data: one track slot's configuration and the process-wide
//! `MixerState` snapshot. State transitions live in [`crate::store`].

use loopmix_common::config::MixerConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of track slots (fixed)
pub const TRACK_COUNT: usize = 8;

/// Stable track slot index (0..TRACK_COUNT)
pub type TrackId = usize;

/// Reference to a playable clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: String,
}

impl VideoRef {
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        thumbnail_url: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            thumbnail_url: thumbnail_url.into(),
        }
    }
}

/// Loop window length; only these values are selectable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum LoopDuration {
    Two,
    Three,
    Six,
    Eight,
    Nine,
    Twelve,
    Sixteen,
}

impl LoopDuration {
    /// Every selectable duration, shortest first
    pub const ALL: [LoopDuration; 7] = [
        LoopDuration::Two,
        LoopDuration::Three,
        LoopDuration::Six,
        LoopDuration::Eight,
        LoopDuration::Nine,
        LoopDuration::Twelve,
        LoopDuration::Sixteen,
    ];

    /// Length in whole seconds
    pub fn seconds(self) -> u32 {
        match self {
            LoopDuration::Two => 2,
            LoopDuration::Three => 3,
            LoopDuration::Six => 6,
            LoopDuration::Eight => 8,
            LoopDuration::Nine => 9,
            LoopDuration::Twelve => 12,
            LoopDuration::Sixteen => 16,
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.seconds())
    }

    /// Uniform pick over [`LoopDuration::ALL`]
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl TryFrom<u32> for LoopDuration {
    type Error = loopmix_common::Error;

    fn try_from(seconds: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|d| d.seconds() == seconds)
            .ok_or_else(|| {
                loopmix_common::Error::InvalidInput(format!(
                    "unsupported loop duration {}s (allowed: 2, 3, 6, 8, 9, 12, 16)",
                    seconds
                ))
            })
    }
}

impl From<LoopDuration> for u32 {
    fn from(d: LoopDuration) -> u32 {
        d.seconds()
    }
}

impl std::fmt::Display for LoopDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.seconds())
    }
}

/// One track slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Slot index, immutable
    pub id: TrackId,
    /// Loaded clip (None = empty slot)
    pub video: Option<VideoRef>,
    /// 0-100
    pub volume: u8,
    pub is_muted: bool,
    pub loop_duration: LoopDuration,
    /// Loop window lower bound in seconds, never negative
    pub start_time: f64,
    /// Only true while `video` is present
    pub is_playing: bool,
}

impl Track {
    pub fn new(id: TrackId, loop_duration: LoopDuration, volume: u8) -> Self {
        Self {
            id,
            video: None,
            volume: volume.min(100),
            is_muted: false,
            loop_duration,
            start_time: 0.0,
            is_playing: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.video.is_some()
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video.as_ref().map(|v| v.video_id.as_str())
    }

    /// Display title ("Empty" for an empty slot)
    pub fn title(&self) -> &str {
        self.video
            .as_ref()
            .map(|v| v.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("Empty")
    }

    /// Loop window upper bound (exclusive)
    pub fn loop_end(&self) -> f64 {
        self.start_time + self.loop_duration.as_secs_f64()
    }
}

/// Process-wide mixer snapshot
///
/// Every store operation produces a new value; a snapshot is never mutated
/// after it has been published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerState {
    pub tracks: [Track; TRACK_COUNT],
    pub search_keyword: String,
    /// Bookkeeping for the transport toggle; not derived from track flags
    pub is_global_playing: bool,
    /// Engine library loaded; set once, never reverts
    pub is_api_ready: bool,
}

impl MixerState {
    /// Initial state with built-in defaults
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_config(&MixerConfig::default(), rng)
    }

    /// Initial state: 8 empty tracks, each with a random loop duration
    pub fn from_config<R: Rng + ?Sized>(config: &MixerConfig, rng: &mut R) -> Self {
        Self {
            tracks: std::array::from_fn(|id| {
                Track::new(id, LoopDuration::random(rng), config.default_volume)
            }),
            search_keyword: config.search_keyword.clone(),
            is_global_playing: false,
            is_api_ready: false,
        }
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    /// Number of slots holding a video
    pub fn loaded_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_loaded()).count()
    }

    /// Label for the play/pause toggle button
    pub fn transport_label(&self) -> &'static str {
        if self.is_global_playing {
            "Pause All"
        } else {
            "Play All"
        }
    }
}
