//! Shared test harness: a full mixer over the simulated engine
//!
//! Tests run on a paused tokio clock (`#[tokio::test(start_paused = true)]`),
//! so the simulated positions and the poll cadence are exact.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use loopmix_common::config::MixerConfig;
use loopmix_common::events::MixerEvent;
use loopmix_mixer::playback::{mount_id, EngineCall, SimulatedPlatform};
use loopmix_mixer::source::{FallbackCatalog, VideoSource};
use loopmix_mixer::{LoopDuration, Mixer, MixerState, MixerStore, TrackId, TRACK_COUNT};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Harness {
    pub mixer: Mixer,
    pub platform: SimulatedPlatform,
}

impl Harness {
    /// Mixer over the fallback catalogue; every track loops 3 s
    pub async fn new() -> Self {
        Self::with_source(Arc::new(FallbackCatalog::new())).await
    }

    pub async fn with_source(source: Arc<dyn VideoSource>) -> Self {
        let platform = SimulatedPlatform::new();
        let config = MixerConfig {
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            ..MixerConfig::default()
        };
        let initial = (0..TRACK_COUNT).fold(
            MixerState::new(&mut StdRng::seed_from_u64(11)),
            |state, id| state.set_track_loop_duration(id, LoopDuration::Three),
        );
        let mixer = Mixer::with_state(&config, initial, Arc::new(platform.clone()), source);
        settle().await;
        Self { mixer, platform }
    }

    pub fn store(&self) -> &MixerStore {
        self.mixer.store()
    }

    pub fn events(&self) -> broadcast::Receiver<MixerEvent> {
        self.mixer.events().subscribe()
    }

    /// Open the gate and let the controllers react
    pub async fn open_gate(&self) {
        assert!(self.mixer.load_engine_library());
        settle().await;
    }

    /// Load `video_id` into `id` and start it playing
    pub async fn load_playing(&self, id: TrackId, video_id: &str) {
        self.store()
            .set_track_video(id, video_id, video_id, "thumb");
        self.store().set_track_playing(id, true);
        settle().await;
    }

    /// Deliver the engine's ready notification for track `id`
    pub async fn ready(&self, id: TrackId) {
        assert!(
            self.platform.fire_ready(&mount_id(id)),
            "track {} has no live engine",
            id
        );
        settle().await;
    }

    pub fn commands(&self, id: TrackId) -> Vec<EngineCall> {
        self.platform.commands(&mount_id(id))
    }

    pub fn calls(&self, id: TrackId) -> Vec<EngineCall> {
        self.platform.calls(&mount_id(id))
    }

    /// Seek targets issued to track `id`, oldest first
    pub fn seeks(&self, id: TrackId) -> Vec<f64> {
        self.calls(id)
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Seek { seconds, .. } => Some(seconds),
                _ => None,
            })
            .collect()
    }

    /// Number of position reads issued to track `id`
    pub fn position_reads(&self, id: TrackId) -> usize {
        self.calls(id)
            .into_iter()
            .filter(|c| *c == EngineCall::CurrentTime)
            .count()
    }
}

/// Let every controller task drain its inputs without moving the clock
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock, firing every timer on the way
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

/// Drain an event receiver
pub fn drain(rx: &mut broadcast::Receiver<MixerEvent>) -> Vec<MixerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
