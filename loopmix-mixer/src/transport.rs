//! Global transport
//!
//! Play/pause/stop across all tracks, plus rerolling clips from the video
//! source. Everything here goes through the store; the track controllers
//! pick the changes up from there.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use loopmix_common::events::{EventBus, MixerEvent, TransportAction};
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{TrackId, TRACK_COUNT};
use crate::source::VideoSource;
use crate::store::MixerStore;

/// Transport controls over a [`MixerStore`]
#[derive(Clone)]
pub struct Transport {
    store: MixerStore,
    events: EventBus,
    source: Arc<dyn VideoSource>,
}

impl Transport {
    pub fn new(store: MixerStore, events: EventBus, source: Arc<dyn VideoSource>) -> Self {
        Self { store, events, source }
    }

    /// Flip between "play all" and "pause all"; returns the new global flag
    ///
    /// Only tracks with a video follow the flag.
    pub fn toggle(&self) -> bool {
        self.store.toggle_global_play();
        self.announce(TransportAction::Toggle)
    }

    pub fn play_all(&self) {
        self.store.play_all();
        self.announce(TransportAction::PlayAll);
    }

    /// Stop every track, including empty ones
    pub fn stop_all(&self) {
        self.store.stop_all();
        self.announce(TransportAction::StopAll);
    }

    fn announce(&self, action: TransportAction) -> bool {
        let is_global_playing = self.store.snapshot().is_global_playing;
        info!(?action, is_global_playing, "transport");
        self.events.emit_lossy(MixerEvent::TransportChanged {
            action,
            is_global_playing,
            timestamp: Utc::now(),
        });
        is_global_playing
    }

    /// Load a fresh clip from the video source into one track
    ///
    /// Returns whether a clip was assigned. A source error propagates and
    /// leaves the track unchanged.
    pub async fn reroll_track(&self, id: TrackId) -> Result<bool> {
        if id >= TRACK_COUNT {
            warn!(track_id = id, "reroll of unknown track ignored");
            return Ok(false);
        }
        let keyword = self.store.snapshot().search_keyword.clone();
        let Some(video) = self.source.search(&keyword).await? else {
            warn!(
                track_id = id,
                source = self.source.name(),
                keyword = %keyword,
                "video source returned nothing, track unchanged"
            );
            return Ok(false);
        };

        self.store
            .set_track_video(id, &video.video_id, &video.title, &video.thumbnail_url);
        info!(track_id = id, video_id = %video.video_id, title = %video.title, "track loaded");
        self.events.emit_lossy(MixerEvent::TrackLoaded {
            track_id: id,
            video_id: video.video_id,
            title: video.title,
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    /// Reroll all tracks, querying the source concurrently
    ///
    /// Failures are logged per track; returns how many tracks got a clip.
    pub async fn reroll_all(&self) -> usize {
        let results = join_all((0..TRACK_COUNT).map(|id| self.reroll_track(id))).await;
        results
            .into_iter()
            .enumerate()
            .filter(|(id, result)| match result {
                Ok(loaded) => *loaded,
                Err(e) => {
                    warn!(track_id = *id, error = %e, "reroll failed, track unchanged");
                    false
                }
            })
            .count()
    }
}
