//! # loopmix Mixer Library (loopmix-mixer)
//!
//! Eight-track looping mixer core.
//!
//! **Purpose:** Keep one player instance per track slot in step with a
//! shared mixer state, and hold each playing track inside its loop window by
//! polling the player position.
//!
//! **Architecture:** Copy-on-write [`store::MixerStore`] observed over a
//! tokio `watch` channel; one [`playback::TrackController`] task per track
//! driving a [`playback::PlaybackEngine`] trait object.

pub mod error;
pub mod mixer;
pub mod model;
pub mod playback;
pub mod source;
pub mod store;
pub mod transport;

pub use error::{Error, Result};
pub use mixer::Mixer;
pub use model::{LoopDuration, MixerState, Track, TrackId, VideoRef, TRACK_COUNT};
pub use store::MixerStore;
