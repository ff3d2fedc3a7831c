//! Track-related type definitions
//!
//! Supporting types for per-track loop lifecycle and engine operations.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of one track's loop controller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// No video assigned, no engine instance
    Empty,
    /// Engine instance requested, ready notification not yet received
    Initializing,
    /// Engine ready, not playing
    ReadyPaused,
    /// Engine ready, playing with the poll loop running
    ReadyLooping,
}

impl LoopPhase {
    /// Whether an engine instance exists in this phase
    pub fn has_engine(self) -> bool {
        !matches!(self, LoopPhase::Empty)
    }

    /// Whether the engine has signalled readiness
    pub fn is_ready(self) -> bool {
        matches!(self, LoopPhase::ReadyPaused | LoopPhase::ReadyLooping)
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopPhase::Empty => write!(f, "Empty"),
            LoopPhase::Initializing => write!(f, "Initializing"),
            LoopPhase::ReadyPaused => write!(f, "ReadyPaused"),
            LoopPhase::ReadyLooping => write!(f, "ReadyLooping"),
        }
    }
}

/// Engine call that failed (reported in EngineFault events)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineOperation {
    Create,
    Play,
    Pause,
    Seek,
    SetVolume,
    Mute,
    Unmute,
    CurrentTime,
    Duration,
    Destroy,
}

impl std::fmt::Display for EngineOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineOperation::Create => "create",
            EngineOperation::Play => "play",
            EngineOperation::Pause => "pause",
            EngineOperation::Seek => "seek",
            EngineOperation::SetVolume => "set_volume",
            EngineOperation::Mute => "mute",
            EngineOperation::Unmute => "unmute",
            EngineOperation::CurrentTime => "current_time",
            EngineOperation::Duration => "duration",
            EngineOperation::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Global transport action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportAction {
    /// Play/pause toggle (touches only tracks with a video)
    Toggle,
    /// Unconditional play of every loaded track
    PlayAll,
    /// Unconditional stop of every track, loaded or not
    StopAll,
}
