//! Mixer store
//!
//! Two layers:
//! - Pure state transitions on [`MixerState`]: each takes the current snapshot
//!   and returns a new one. All are total; an out-of-range track id leaves the
//!   state unchanged.
//! - [`MixerStore`]: the shared container. Applies one transition at a time
//!   and publishes the resulting snapshot to subscribers (tokio `watch`).
//!
//! The store never talks to a playback engine. Track controllers observe it
//! and react.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::model::{LoopDuration, MixerState, Track, TrackId, VideoRef};

// ========================================
// Pure transitions
// ========================================

impl MixerState {
    /// Copy of `self` with `f` applied to one track (no-op for unknown ids)
    fn map_track(&self, id: TrackId, f: impl FnOnce(&mut Track)) -> MixerState {
        let mut next = self.clone();
        if let Some(track) = next.tracks.get_mut(id) {
            f(track);
        }
        next
    }

    /// Open the engine gate; once open it never closes
    pub fn set_api_ready(&self, ready: bool) -> MixerState {
        MixerState {
            is_api_ready: self.is_api_ready || ready,
            ..self.clone()
        }
    }

    pub fn set_search_keyword(&self, keyword: &str) -> MixerState {
        MixerState {
            search_keyword: keyword.to_string(),
            ..self.clone()
        }
    }

    /// Assign a clip; the loop window restarts at 0
    pub fn set_track_video(
        &self,
        id: TrackId,
        video_id: &str,
        title: &str,
        thumbnail_url: &str,
    ) -> MixerState {
        self.map_track(id, |t| {
            t.video = Some(VideoRef::new(video_id, title, thumbnail_url));
            t.start_time = 0.0;
        })
    }

    /// Volume above 100 is clamped
    pub fn set_track_volume(&self, id: TrackId, volume: u8) -> MixerState {
        self.map_track(id, |t| t.volume = volume.min(100))
    }

    pub fn toggle_track_mute(&self, id: TrackId) -> MixerState {
        self.map_track(id, |t| t.is_muted = !t.is_muted)
    }

    pub fn set_track_loop_duration(&self, id: TrackId, duration: LoopDuration) -> MixerState {
        self.map_track(id, |t| t.loop_duration = duration)
    }

    /// Empty tracks cannot start playing
    pub fn set_track_playing(&self, id: TrackId, playing: bool) -> MixerState {
        self.map_track(id, |t| t.is_playing = playing && t.is_loaded())
    }

    /// Negative or non-finite values become 0
    pub fn set_track_start_time(&self, id: TrackId, seconds: f64) -> MixerState {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.map_track(id, |t| t.start_time = seconds)
    }

    /// Flip the global flag and fan it out to every loaded track
    pub fn toggle_global_play(&self) -> MixerState {
        let playing = !self.is_global_playing;
        let mut next = self.clone();
        next.is_global_playing = playing;
        for track in next.tracks.iter_mut().filter(|t| t.is_loaded()) {
            track.is_playing = playing;
        }
        next
    }

    pub fn play_all(&self) -> MixerState {
        let mut next = self.clone();
        next.is_global_playing = true;
        for track in next.tracks.iter_mut().filter(|t| t.is_loaded()) {
            track.is_playing = true;
        }
        next
    }

    /// Stops every track, loaded or not
    pub fn stop_all(&self) -> MixerState {
        let mut next = self.clone();
        next.is_global_playing = false;
        for track in next.tracks.iter_mut() {
            track.is_playing = false;
        }
        next
    }

    /// Back to empty; volume, mute and loop duration are kept
    pub fn clear_track(&self, id: TrackId) -> MixerState {
        self.map_track(id, |t| {
            t.video = None;
            t.is_playing = false;
            t.start_time = 0.0;
        })
    }
}

// ========================================
// Shared container
// ========================================

/// Shared, observable holder of the current [`MixerState`]
///
/// Cloning is cheap; all clones refer to the same state.
#[derive(Clone)]
pub struct MixerStore {
    tx: Arc<watch::Sender<Arc<MixerState>>>,
}

impl MixerStore {
    pub fn new(initial: MixerState) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<MixerState> {
        self.tx.borrow().clone()
    }

    /// Current state of one track
    pub fn track(&self, id: TrackId) -> Option<Track> {
        self.tx.borrow().track(id).cloned()
    }

    /// Observe every published snapshot
    ///
    /// The receiver starts out having "seen" the current snapshot; call
    /// `borrow_and_update` to read it, `changed().await` to wait for the next.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MixerState>> {
        self.tx.subscribe()
    }

    /// Apply one transition atomically
    ///
    /// Subscribers are woken only if the snapshot actually changed. Returns
    /// whether it did.
    pub fn apply(&self, op: &'static str, f: impl FnOnce(&MixerState) -> MixerState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            let next = f(current);
            if next == **current {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        });
        debug!(op, changed, "store operation");
        changed
    }

    pub fn set_api_ready(&self, ready: bool) -> bool {
        self.apply("set_api_ready", |s| s.set_api_ready(ready))
    }

    pub fn set_search_keyword(&self, keyword: &str) -> bool {
        self.apply("set_search_keyword", |s| s.set_search_keyword(keyword))
    }

    pub fn set_track_video(
        &self,
        id: TrackId,
        video_id: &str,
        title: &str,
        thumbnail_url: &str,
    ) -> bool {
        self.apply("set_track_video", |s| {
            s.set_track_video(id, video_id, title, thumbnail_url)
        })
    }

    pub fn set_track_volume(&self, id: TrackId, volume: u8) -> bool {
        self.apply("set_track_volume", |s| s.set_track_volume(id, volume))
    }

    pub fn toggle_track_mute(&self, id: TrackId) -> bool {
        self.apply("toggle_track_mute", |s| s.toggle_track_mute(id))
    }

    pub fn set_track_loop_duration(&self, id: TrackId, duration: LoopDuration) -> bool {
        self.apply("set_track_loop_duration", |s| {
            s.set_track_loop_duration(id, duration)
        })
    }

    pub fn set_track_playing(&self, id: TrackId, playing: bool) -> bool {
        self.apply("set_track_playing", |s| s.set_track_playing(id, playing))
    }

    pub fn set_track_start_time(&self, id: TrackId, seconds: f64) -> bool {
        self.apply("set_track_start_time", |s| s.set_track_start_time(id, seconds))
    }

    pub fn toggle_global_play(&self) -> bool {
        self.apply("toggle_global_play", MixerState::toggle_global_play)
    }

    pub fn play_all(&self) -> bool {
        self.apply("play_all", MixerState::play_all)
    }

    pub fn stop_all(&self) -> bool {
        self.apply("stop_all", MixerState::stop_all)
    }

    pub fn clear_track(&self, id: TrackId) -> bool {
        self.apply("clear_track", |s| s.clear_track(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TRACK_COUNT;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn initial() -> MixerState {
        MixerState::new(&mut StdRng::seed_from_u64(42))
    }

    fn loaded(state: &MixerState, ids: &[TrackId]) -> MixerState {
        ids.iter().fold(state.clone(), |s, &id| {
            s.set_track_video(id, &format!("vid{}", id), "title", "thumb")
        })
    }

    fn assert_playing_implies_loaded(state: &MixerState) {
        for t in &state.tracks {
            assert!(!t.is_playing || t.is_loaded(), "track {} playing while empty", t.id);
        }
    }

    #[test]
    fn test_set_track_video_resets_start_time() {
        let state = loaded(&initial(), &[0]).set_track_start_time(0, 12.5);
        assert_eq!(state.tracks[0].start_time, 12.5);

        let next = state.set_track_video(0, "other", "Other", "thumb2");
        let track = &next.tracks[0];
        assert_eq!(track.start_time, 0.0);
        assert_eq!(track.video, Some(VideoRef::new("other", "Other", "thumb2")));
    }

    #[test]
    fn test_clear_track_keeps_mixing_settings() {
        let state = loaded(&initial(), &[3])
            .set_track_volume(3, 80)
            .toggle_track_mute(3)
            .set_track_loop_duration(3, LoopDuration::Twelve)
            .set_track_start_time(3, 9.0)
            .set_track_playing(3, true);

        let cleared = state.clear_track(3);
        let track = &cleared.tracks[3];
        assert!(track.video.is_none());
        assert!(!track.is_playing);
        assert_eq!(track.start_time, 0.0);
        assert_eq!(track.volume, 80);
        assert!(track.is_muted);
        assert_eq!(track.loop_duration, LoopDuration::Twelve);
    }

    #[test]
    fn test_toggle_global_play_round_trip() {
        let state = loaded(&initial(), &[0, 2, 5]).set_track_playing(2, true);
        let once = state.toggle_global_play();
        assert!(once.is_global_playing);
        for t in &once.tracks {
            assert_eq!(t.is_playing, t.is_loaded());
        }
        assert_playing_implies_loaded(&once);

        let twice = once.toggle_global_play();
        assert!(!twice.is_global_playing);
        // Loaded tracks follow the global flag back, empty tracks were never touched
        for t in &twice.tracks {
            assert!(!t.is_playing);
        }
        assert_playing_implies_loaded(&twice);
    }

    #[test]
    fn test_toggle_global_play_twice_restores_when_aligned() {
        // Loaded tracks all paused, global flag false: two toggles give back the same state
        let state = loaded(&initial(), &[1, 4]);
        assert_eq!(state.toggle_global_play().toggle_global_play(), state);
    }

    #[test]
    fn test_play_all_skips_empty_tracks() {
        let state = loaded(&initial(), &[6]).play_all();
        assert!(state.is_global_playing);
        assert!(state.tracks[6].is_playing);
        assert_eq!(state.tracks.iter().filter(|t| t.is_playing).count(), 1);
    }

    #[test]
    fn test_stop_all_stops_everything() {
        let state = loaded(&initial(), &[0, 1]).play_all().stop_all();
        assert!(!state.is_global_playing);
        assert!(state.tracks.iter().all(|t| !t.is_playing));
    }

    #[test]
    fn test_set_playing_on_empty_track_is_ignored() {
        let state = initial().set_track_playing(0, true);
        assert!(!state.tracks[0].is_playing);
        assert_playing_implies_loaded(&state);
    }

    #[test]
    fn test_out_of_range_id_is_noop() {
        let state = initial();
        let id = TRACK_COUNT;
        assert_eq!(state.set_track_video(id, "x", "x", "x"), state);
        assert_eq!(state.set_track_volume(id, 10), state);
        assert_eq!(state.toggle_track_mute(id), state);
        assert_eq!(state.set_track_loop_duration(id, LoopDuration::Two), state);
        assert_eq!(state.set_track_playing(id, true), state);
        assert_eq!(state.set_track_start_time(id, 3.0), state);
        assert_eq!(state.clear_track(id), state);
    }

    #[test]
    fn test_value_coercion() {
        let state = loaded(&initial(), &[0])
            .set_track_volume(0, 250)
            .set_track_start_time(1, -4.0)
            .set_track_start_time(2, f64::NAN);
        assert_eq!(state.tracks[0].volume, 100);
        assert_eq!(state.tracks[1].start_time, 0.0);
        assert_eq!(state.tracks[2].start_time, 0.0);
    }

    #[test]
    fn test_api_ready_never_reverts() {
        let state = initial().set_api_ready(true).set_api_ready(false);
        assert!(state.is_api_ready);
    }

    #[test]
    fn test_invariant_over_operation_sequence() {
        let ops: Vec<fn(&MixerState) -> MixerState> = vec![
            |s| s.set_track_video(0, "a", "A", "ta"),
            |s| s.toggle_global_play(),
            |s| s.set_track_playing(5, true),
            |s| s.clear_track(0),
            |s| s.play_all(),
            |s| s.set_track_video(7, "b", "B", "tb"),
            |s| s.toggle_global_play(),
            |s| s.toggle_global_play(),
            |s| s.clear_track(7),
            |s| s.stop_all(),
        ];
        let mut state = initial();
        for op in ops {
            state = op(&state);
            assert_playing_implies_loaded(&state);
        }
    }

    #[test]
    fn test_store_publishes_only_changes() {
        let store = MixerStore::new(initial());
        let mut rx = store.subscribe();
        let _ = rx.borrow_and_update();

        assert!(store.set_track_video(1, "v", "t", "th"));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        // Same volume again: no new snapshot
        assert!(!store.set_track_volume(1, 50));
        assert!(!rx.has_changed().unwrap());

        // Unknown track: no new snapshot
        assert!(!store.clear_track(99));
        assert!(!rx.has_changed().unwrap());

        assert_eq!(store.track(1).unwrap().video_id(), Some("v"));
        assert_eq!(store.snapshot().loaded_count(), 1);
    }
}
