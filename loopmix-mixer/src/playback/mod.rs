//! Per-track playback loop control
//!
//! The engine adapter traits, the simulated engine, the library gate and the
//! track loop controller (state machine, poll timer, task driver).

pub mod bootstrap;
pub mod controller;
pub mod engine;
pub mod poll;
pub mod simulated;
pub mod track_loop;

pub use bootstrap::{GateState, LibraryGate};
pub use controller::{LoopInput, TrackController};
pub use engine::{
    mount_id, EngineError, EngineFactory, EngineNotification, EngineNotifier, PlaybackEngine,
    PlayerOptions, PlayerState,
};
pub use simulated::{EngineCall, SimulatedPlatform};
pub use track_loop::TrackLoop;
