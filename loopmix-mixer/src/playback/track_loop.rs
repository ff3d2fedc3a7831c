//! Per-track playback loop state machine
//!
//! Owns at most one engine instance for one track slot and keeps it in step
//! with the track's state in the store:
//!
//! ```text
//! Empty ──video + gate open──▶ Initializing ──ready──▶ ReadyPaused ◀──▶ ReadyLooping
//!   ▲                              │                        │                │
//!   └────── video cleared / changed (teardown, then rebuild) ┴────────────────┘
//! ```
//!
//! All methods are synchronous and run on the controller task; the async
//! plumbing lives in [`super::controller`].

use std::sync::Arc;

use chrono::Utc;
use loopmix_common::events::{EngineOperation, EventBus, LoopPhase, MixerEvent};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::controller::LoopInput;
use super::engine::{
    mount_id, EngineError, EngineFactory, EngineNotification, EngineNotifier, EngineResult,
    PlaybackEngine, PlayerOptions, PlayerState,
};
use super::poll::{LoopWindow, PollTimer};
use crate::model::{MixerState, Track, TrackId};

/// Playback loop for one track slot
pub struct TrackLoop {
    track_id: TrackId,
    mount_id: String,
    factory: Arc<dyn EngineFactory>,
    tx: mpsc::UnboundedSender<LoopInput>,
    events: EventBus,
    poll: PollTimer,

    engine: Option<Box<dyn PlaybackEngine>>,
    /// Identity of the live instance (0 = none)
    instance: u64,
    next_instance: u64,
    /// Video id the live instance was built for
    loaded_video: Option<String>,
    ready: bool,
    /// Live instance was created with autoplay
    autoplay: bool,

    /// Last observed state of this track
    track: Option<Track>,
    phase: LoopPhase,
}

impl TrackLoop {
    pub fn new(
        track_id: TrackId,
        factory: Arc<dyn EngineFactory>,
        tx: mpsc::UnboundedSender<LoopInput>,
        events: EventBus,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            track_id,
            mount_id: mount_id(track_id),
            factory,
            poll: PollTimer::new(poll_interval, tx.clone()),
            tx,
            events,
            engine: None,
            instance: 0,
            next_instance: 1,
            loaded_video: None,
            ready: false,
            autoplay: false,
            track: None,
            phase: LoopPhase::Empty,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn mount_id(&self) -> &str {
        &self.mount_id
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Whether the loop poll is running
    pub fn is_polling(&self) -> bool {
        self.poll.is_running()
    }

    // ========================================
    // Inputs
    // ========================================

    /// React to a new store snapshot
    pub fn on_state(&mut self, state: &MixerState) {
        let Some(track) = state.track(self.track_id).cloned() else {
            return;
        };
        let prev = self.track.replace(track.clone());

        let Some(video_id) = track.video_id() else {
            if self.engine.is_some() || self.phase != LoopPhase::Empty {
                debug!(track_id = self.track_id, "video cleared, tearing down");
                self.teardown();
            }
            return;
        };

        if !state.is_api_ready {
            return;
        }

        if self.engine.is_none() || self.loaded_video.as_deref() != Some(video_id) {
            self.rebuild(&track);
            return;
        }

        // Same instance: forward what changed. Until ready, the ready
        // handler picks up the latest state instead.
        if !self.ready {
            return;
        }
        let Some(prev) = prev else {
            return;
        };

        if track.volume != prev.volume {
            let volume = track.volume;
            self.command(EngineOperation::SetVolume, |e| e.set_volume(volume));
        }
        if track.is_muted != prev.is_muted {
            if track.is_muted {
                self.command(EngineOperation::Mute, |e| e.mute());
            } else {
                self.command(EngineOperation::Unmute, |e| e.unmute());
            }
        }

        if track.is_playing != prev.is_playing {
            if track.is_playing {
                self.command(EngineOperation::Play, |e| e.play());
                self.start_poll(&track);
                self.set_phase(LoopPhase::ReadyLooping);
            } else {
                self.command(EngineOperation::Pause, |e| e.pause());
                self.poll.cancel();
                self.set_phase(LoopPhase::ReadyPaused);
            }
        } else if track.is_playing
            && (track.loop_duration != prev.loop_duration || track.start_time != prev.start_time)
        {
            // New window takes effect from the next tick; no immediate seek
            self.start_poll(&track);
        }
    }

    /// Handle an engine notification
    pub fn on_notification(&mut self, instance: u64, notification: EngineNotification) {
        if self.engine.is_none() || instance != self.instance {
            trace!(
                track_id = self.track_id,
                instance,
                current = self.instance,
                ?notification,
                "dropping notification from stale instance"
            );
            return;
        }

        match notification {
            EngineNotification::Ready => self.on_ready(),
            EngineNotification::StateChanged(code) => match PlayerState::from_code(code) {
                Some(PlayerState::Ended) => self.on_ended(),
                state => trace!(track_id = self.track_id, code, ?state, "player state changed"),
            },
        }
    }

    /// Poll tick: pull the position back into the loop window if it escaped
    pub fn on_poll_tick(&mut self, generation: u64) {
        if !self.poll.is_current(generation) {
            trace!(track_id = self.track_id, generation, "stale poll tick");
            return;
        }
        let (Some(window), Some(engine)) = (self.poll.window(), self.engine.as_ref()) else {
            return;
        };

        let position = match engine.current_time() {
            Ok(position) => position,
            Err(e) => {
                // Transient; try again next tick
                debug!(track_id = self.track_id, error = %e, "position read failed");
                return;
            }
        };

        if window.needs_correction(position) {
            trace!(
                track_id = self.track_id,
                position,
                start = window.start,
                end = window.end,
                "position outside loop window, seeking back"
            );
            if self.command(EngineOperation::Seek, |e| e.seek(window.start, true)) {
                self.events.emit_lossy(MixerEvent::LoopCorrected {
                    track_id: self.track_id,
                    position,
                    start_time: window.start,
                    end_time: window.end,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Pick a random loop start within the clip and seek there
    ///
    /// Returns the new start time; the caller writes it to the store. `None`
    /// if there is no instance, the duration is unknown, or the clip is not
    /// longer than the loop.
    pub fn randomize_start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<f64> {
        let loop_length = self.track.as_ref()?.loop_duration.as_secs_f64();
        let duration = match self.engine.as_ref()?.duration() {
            Ok(d) if d.is_finite() => d,
            Ok(_) => return None,
            Err(e) => {
                self.fault(EngineOperation::Duration, &e);
                return None;
            }
        };
        if duration <= loop_length {
            debug!(
                track_id = self.track_id,
                duration, loop_length, "clip not longer than loop, start unchanged"
            );
            return None;
        }

        let start = rng.gen_range(0.0..duration - loop_length).floor();
        self.command(EngineOperation::Seek, |e| e.seek(start, true));
        self.events.emit_lossy(MixerEvent::StartRandomized {
            track_id: self.track_id,
            start_time: start,
            duration,
            timestamp: Utc::now(),
        });
        Some(start)
    }

    /// Cancel the poll and destroy the instance; idempotent
    pub fn teardown(&mut self) {
        self.poll.cancel();
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.destroy() {
                debug!(track_id = self.track_id, error = %e, "destroy failed (ignored)");
            }
        }
        self.instance = 0;
        self.loaded_video = None;
        self.ready = false;
        self.autoplay = false;
        self.set_phase(LoopPhase::Empty);
    }

    // ========================================
    // Transitions
    // ========================================

    fn rebuild(&mut self, track: &Track) {
        self.teardown();
        let Some(video) = track.video.as_ref() else {
            return;
        };

        let instance = self.next_instance;
        self.next_instance += 1;
        let notifier = EngineNotifier::new(self.track_id, instance, self.tx.clone());
        let options = PlayerOptions::for_clip(
            &video.video_id,
            track.is_playing,
            track.is_muted,
            track.start_time,
        );

        match self.factory.create(&self.mount_id, options, notifier) {
            Ok(engine) => {
                info!(
                    track_id = self.track_id,
                    video_id = %video.video_id,
                    instance,
                    "engine instance created"
                );
                self.engine = Some(engine);
                self.instance = instance;
                self.loaded_video = Some(video.video_id.clone());
                self.autoplay = track.is_playing;
                self.set_phase(LoopPhase::Initializing);
            }
            Err(EngineError::MountMissing(mount)) => {
                // Retried on the next store change for this track
                warn!(track_id = self.track_id, mount = %mount, "mount point missing, engine not created");
            }
            Err(e) => self.fault(EngineOperation::Create, &e),
        }
    }

    fn on_ready(&mut self) {
        if self.ready {
            return;
        }
        self.ready = true;
        let Some(track) = self.track.clone() else {
            return;
        };
        debug!(track_id = self.track_id, instance = self.instance, "engine ready");

        let volume = track.volume;
        self.command(EngineOperation::SetVolume, |e| e.set_volume(volume));
        if track.is_muted {
            self.command(EngineOperation::Mute, |e| e.mute());
        }

        if track.is_playing {
            let start = track.start_time;
            self.command(EngineOperation::Seek, |e| e.seek(start, true));
            self.command(EngineOperation::Play, |e| e.play());
            self.start_poll(&track);
            self.set_phase(LoopPhase::ReadyLooping);
        } else {
            if self.autoplay {
                // Stopped while initializing
                self.command(EngineOperation::Pause, |e| e.pause());
            }
            self.set_phase(LoopPhase::ReadyPaused);
        }
    }

    fn on_ended(&mut self) {
        let Some(start) = self.track.as_ref().map(|t| t.start_time) else {
            return;
        };
        debug!(track_id = self.track_id, start, "clip ended, restarting loop");
        self.command(EngineOperation::Seek, |e| e.seek(start, true));
        self.command(EngineOperation::Play, |e| e.play());
        self.events.emit_lossy(MixerEvent::LoopRestarted {
            track_id: self.track_id,
            start_time: start,
            timestamp: Utc::now(),
        });
    }

    fn start_poll(&mut self, track: &Track) {
        self.poll.start(LoopWindow::new(
            track.start_time,
            track.loop_duration.as_secs_f64(),
        ));
    }

    // ========================================
    // Helpers
    // ========================================

    /// Run one engine command, swallowing (and reporting) failure
    fn command(
        &mut self,
        operation: EngineOperation,
        f: impl FnOnce(&mut dyn PlaybackEngine) -> EngineResult<()>,
    ) -> bool {
        let result = match self.engine.as_mut() {
            Some(engine) => f(engine.as_mut()),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.fault(operation, &e);
                false
            }
        }
    }

    fn fault(&self, operation: EngineOperation, error: &EngineError) {
        warn!(track_id = self.track_id, %operation, error = %error, "engine call failed");
        self.events.emit_lossy(MixerEvent::EngineFault {
            track_id: self.track_id,
            operation,
            message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn set_phase(&mut self, new_phase: LoopPhase) {
        if self.phase == new_phase {
            return;
        }
        let old_phase = std::mem::replace(&mut self.phase, new_phase);
        debug!(track_id = self.track_id, %old_phase, %new_phase, "phase changed");
        self.events.emit_lossy(MixerEvent::PhaseChanged {
            track_id: self.track_id,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }
}

impl Drop for TrackLoop {
    fn drop(&mut self) {
        self.teardown();
    }
}
