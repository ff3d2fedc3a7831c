//! Simulated playback engine
//!
//! Deterministic, in-process implementation of [`EngineFactory`] /
//! [`PlaybackEngine`]. Used by the test suite and by the `loopmix` binary when
//! no real player is attached.
//!
//! Position advances with the tokio clock while an instance is playing, so
//! tests running with a paused clock see exact positions. Positions can also
//! be scripted per mount point, and every call is recorded for inspection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::engine::{
    EngineError, EngineFactory, EngineNotifier, EngineResult, PlaybackEngine, PlayerOptions,
    PlayerState,
};

/// Default clip length when none was registered for a video
const DEFAULT_DURATION_SECS: f64 = 180.0;

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Create(PlayerOptions),
    Play,
    Pause,
    Seek { seconds: f64, allow_seek_ahead: bool },
    SetVolume(u8),
    Mute,
    Unmute,
    CurrentTime,
    Duration,
    Destroy,
}

#[derive(Debug)]
struct InstanceState {
    mount_id: String,
    notifier: EngineNotifier,
    autoplay: bool,
    ready: bool,
    destroyed: bool,
    playing: bool,
    muted: bool,
    volume: u8,
    duration: f64,
    /// Position at `since` (or the frozen position while paused)
    base_position: f64,
    since: Instant,
}

impl InstanceState {
    fn position(&self, now: Instant) -> f64 {
        let pos = if self.playing {
            self.base_position + now.saturating_duration_since(self.since).as_secs_f64()
        } else {
            self.base_position
        };
        pos.min(self.duration)
    }

    fn freeze(&mut self, now: Instant) {
        self.base_position = self.position(now);
        self.since = now;
    }
}

#[derive(Debug)]
struct PlatformState {
    next_instance: u64,
    instances: HashMap<u64, InstanceState>,
    calls: Vec<(String, EngineCall)>,
    missing_mounts: HashSet<String>,
    durations: HashMap<String, f64>,
    scripted_positions: HashMap<String, VecDeque<f64>>,
    ready_delay: Option<Duration>,
    failing: bool,
}

/// Simulated player platform: the engine factory plus an inspection handle
///
/// Cloning is cheap; all clones share the same platform.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    inner: Arc<Mutex<PlatformState>>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// Platform whose instances only become ready via [`fire_ready`](Self::fire_ready)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlatformState {
                next_instance: 1,
                instances: HashMap::new(),
                calls: Vec::new(),
                missing_mounts: HashSet::new(),
                durations: HashMap::new(),
                scripted_positions: HashMap::new(),
                ready_delay: None,
                failing: false,
            })),
        }
    }

    /// Instances signal readiness on their own after `delay`
    pub fn with_ready_delay(delay: Duration) -> Self {
        let platform = Self::new();
        platform.state().ready_delay = Some(delay);
        platform
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the clip length reported for `video_id`
    pub fn set_duration(&self, video_id: &str, seconds: f64) {
        self.state().durations.insert(video_id.to_string(), seconds);
    }

    /// Make a mount point disappear (engine construction will fail)
    pub fn remove_mount(&self, mount_id: &str) {
        self.state().missing_mounts.insert(mount_id.to_string());
    }

    pub fn restore_mount(&self, mount_id: &str) {
        self.state().missing_mounts.remove(mount_id);
    }

    /// Every subsequent command and query fails
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Queue positions returned by `current_time` on the instance in `mount_id`
    ///
    /// Once the script runs out the clock-based position is used again.
    pub fn script_positions(&self, mount_id: &str, positions: impl IntoIterator<Item = f64>) {
        self.state()
            .scripted_positions
            .entry(mount_id.to_string())
            .or_default()
            .extend(positions);
    }

    /// Live (not destroyed) instance in `mount_id`, if any
    fn live_instance(state: &PlatformState, mount_id: &str) -> Option<u64> {
        state
            .instances
            .iter()
            .filter(|(_, i)| i.mount_id == mount_id && !i.destroyed)
            .map(|(id, _)| *id)
            .max()
    }

    /// Deliver the readiness notification for the live instance in `mount_id`
    ///
    /// Returns false if there is no live instance.
    pub fn fire_ready(&self, mount_id: &str) -> bool {
        let notifier = {
            let mut state = self.state();
            let Some(notifier) = Self::live_instance(&state, mount_id)
                .and_then(|id| mark_ready(&mut state, id))
            else {
                return false;
            };
            notifier
        };
        notifier.ready();
        true
    }

    /// Deliver an "ended" state change for the live instance in `mount_id`
    pub fn fire_ended(&self, mount_id: &str) -> bool {
        let notifier = {
            let mut state = self.state();
            let Some(id) = Self::live_instance(&state, mount_id) else {
                return false;
            };
            let now = Instant::now();
            let Some(instance) = state.instances.get_mut(&id) else {
                return false;
            };
            instance.base_position = instance.duration;
            instance.playing = false;
            instance.since = now;
            instance.notifier.clone()
        };
        notifier.state_changed(PlayerState::Ended);
        true
    }

    /// Calls recorded for `mount_id`, oldest first
    pub fn calls(&self, mount_id: &str) -> Vec<EngineCall> {
        self.state()
            .calls
            .iter()
            .filter(|(m, _)| m == mount_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Commands recorded for `mount_id` (queries filtered out)
    pub fn commands(&self, mount_id: &str) -> Vec<EngineCall> {
        self.calls(mount_id)
            .into_iter()
            .filter(|c| !matches!(c, EngineCall::CurrentTime | EngineCall::Duration))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of instances created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.state().instances.values().filter(|i| !i.destroyed).count()
    }

    /// Whether a live instance in `mount_id` is currently playing
    pub fn is_playing(&self, mount_id: &str) -> bool {
        let state = self.state();
        Self::live_instance(&state, mount_id)
            .and_then(|id| state.instances.get(&id))
            .map(|i| i.playing)
            .unwrap_or(false)
    }

    /// Clock-based position of the live instance in `mount_id`
    pub fn position(&self, mount_id: &str) -> Option<f64> {
        let state = self.state();
        Self::live_instance(&state, mount_id)
            .and_then(|id| state.instances.get(&id))
            .map(|i| i.position(Instant::now()))
    }
}

/// Flag an instance ready (starting autoplay) and hand back its notifier
///
/// `None` for unknown or destroyed instances.
fn mark_ready(state: &mut PlatformState, id: u64) -> Option<EngineNotifier> {
    let now = Instant::now();
    let instance = state.instances.get_mut(&id).filter(|i| !i.destroyed)?;
    if !instance.ready {
        instance.ready = true;
        if instance.autoplay {
            instance.playing = true;
            instance.since = now;
        }
    }
    Some(instance.notifier.clone())
}

impl EngineFactory for SimulatedPlatform {
    fn create(
        &self,
        mount_id: &str,
        options: PlayerOptions,
        notifier: EngineNotifier,
    ) -> EngineResult<Box<dyn PlaybackEngine>> {
        let (id, ready_delay) = {
            let mut state = self.state();
            if state.missing_mounts.contains(mount_id) {
                return Err(EngineError::MountMissing(mount_id.to_string()));
            }
            state
                .calls
                .push((mount_id.to_string(), EngineCall::Create(options.clone())));

            let id = state.next_instance;
            state.next_instance += 1;
            let duration = state
                .durations
                .get(&options.video_id)
                .copied()
                .unwrap_or(DEFAULT_DURATION_SECS);
            state.instances.insert(
                id,
                InstanceState {
                    mount_id: mount_id.to_string(),
                    notifier,
                    autoplay: options.autoplay,
                    ready: false,
                    destroyed: false,
                    playing: false,
                    muted: options.muted,
                    volume: 100,
                    duration,
                    base_position: f64::from(options.start_seconds).min(duration),
                    since: Instant::now(),
                },
            );
            (id, state.ready_delay)
        };
        debug!(mount_id, instance = id, video_id = %options.video_id, "simulated engine created");

        if let Some(delay) = ready_delay {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = Arc::clone(&self.inner);
                    handle.spawn(async move {
                        tokio::time::sleep(delay).await;
                        let notifier = {
                            let mut state = inner.lock().unwrap_or_else(|e| e.into_inner());
                            mark_ready(&mut state, id)
                        };
                        if let Some(notifier) = notifier {
                            notifier.ready();
                        }
                    });
                }
                Err(_) => warn!(mount_id, "no tokio runtime; simulated engine will not auto-ready"),
            }
        }

        Ok(Box::new(SimulatedEngine {
            inner: Arc::clone(&self.inner),
            mount_id: mount_id.to_string(),
            id,
        }))
    }
}

/// Handle to one simulated instance
pub struct SimulatedEngine {
    inner: Arc<Mutex<PlatformState>>,
    mount_id: String,
    id: u64,
}

impl SimulatedEngine {
    /// Record the call, then run `f` on the instance if it accepts commands
    fn with_instance<T>(
        &self,
        call: EngineCall,
        f: impl FnOnce(&mut InstanceState, Instant) -> T,
    ) -> EngineResult<T> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push((self.mount_id.clone(), call));
        if state.failing {
            return Err(EngineError::Command("injected failure".to_string()));
        }
        let instance = state.instances.get_mut(&self.id).ok_or(EngineError::Destroyed)?;
        if instance.destroyed {
            return Err(EngineError::Destroyed);
        }
        if !instance.ready {
            return Err(EngineError::NotReady);
        }
        Ok(f(instance, Instant::now()))
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn play(&mut self) -> EngineResult<()> {
        self.with_instance(EngineCall::Play, |i, now| {
            if !i.playing {
                i.freeze(now);
                i.playing = true;
            }
        })
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.with_instance(EngineCall::Pause, |i, now| {
            i.freeze(now);
            i.playing = false;
        })
    }

    fn seek(&mut self, seconds: f64, allow_seek_ahead: bool) -> EngineResult<()> {
        let call = EngineCall::Seek { seconds, allow_seek_ahead };
        self.with_instance(call, |i, now| {
            i.base_position = seconds.clamp(0.0, i.duration);
            i.since = now;
        })
    }

    fn set_volume(&mut self, volume: u8) -> EngineResult<()> {
        self.with_instance(EngineCall::SetVolume(volume), |i, _| i.volume = volume.min(100))
    }

    fn mute(&mut self) -> EngineResult<()> {
        self.with_instance(EngineCall::Mute, |i, _| i.muted = true)
    }

    fn unmute(&mut self) -> EngineResult<()> {
        self.with_instance(EngineCall::Unmute, |i, _| i.muted = false)
    }

    fn current_time(&self) -> EngineResult<f64> {
        let scripted = {
            let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            state
                .scripted_positions
                .get_mut(&self.mount_id)
                .and_then(|q| q.pop_front())
        };
        let (position, ended) = self.with_instance(EngineCall::CurrentTime, |i, now| {
            let pos = i.position(now);
            let ended = i.playing && pos >= i.duration;
            if ended {
                i.freeze(now);
                i.playing = false;
            }
            (scripted.unwrap_or(pos), ended.then(|| i.notifier.clone()))
        })?;
        if let Some(notifier) = ended {
            notifier.state_changed(PlayerState::Ended);
        }
        Ok(position)
    }

    fn duration(&self) -> EngineResult<f64> {
        self.with_instance(EngineCall::Duration, |i, _| i.duration)
    }

    fn destroy(&mut self) -> EngineResult<()> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push((self.mount_id.clone(), EngineCall::Destroy));
        // Scripted positions belong to the destroyed instance
        state.scripted_positions.remove(&self.mount_id);
        let failing = state.failing;
        let instance = state.instances.get_mut(&self.id).ok_or(EngineError::Destroyed)?;
        if instance.destroyed {
            return Err(EngineError::Destroyed);
        }
        instance.destroyed = true;
        instance.playing = false;
        if failing {
            return Err(EngineError::Command("injected failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::controller::LoopInput;
    use tokio::sync::mpsc;

    fn notifier() -> (EngineNotifier, mpsc::UnboundedReceiver<LoopInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EngineNotifier::new(0, 1, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_follows_clock() {
        let platform = SimulatedPlatform::new();
        platform.set_duration("clip", 30.0);
        let (n, _rx) = notifier();
        let mut engine = platform
            .create("m0", PlayerOptions::for_clip("clip", false, false, 4.0), n)
            .unwrap();

        // Not ready yet
        assert_eq!(engine.play(), Err(EngineError::NotReady));
        assert!(platform.fire_ready("m0"));

        engine.play().unwrap();
        tokio::time::advance(Duration::from_millis(2500)).await;
        let pos = engine.current_time().unwrap();
        assert!((pos - 6.5).abs() < 1e-9, "pos = {}", pos);

        engine.pause().unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!((engine.current_time().unwrap() - 6.5).abs() < 1e-9);

        engine.seek(1.0, true).unwrap();
        assert_eq!(engine.current_time().unwrap(), 1.0);
        assert_eq!(engine.duration().unwrap(), 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaching_end_notifies_ended() {
        let platform = SimulatedPlatform::new();
        platform.set_duration("short", 2.0);
        let (n, mut rx) = notifier();
        let mut engine = platform
            .create("m0", PlayerOptions::for_clip("short", true, false, 0.0), n)
            .unwrap();
        platform.fire_ready("m0");
        // Drain the Ready notification
        rx.recv().await.unwrap();
        assert!(platform.is_playing("m0"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(engine.current_time().unwrap(), 2.0);
        match rx.recv().await.unwrap() {
            LoopInput::Notification { notification, .. } => {
                assert_eq!(
                    notification,
                    crate::playback::engine::EngineNotification::StateChanged(0)
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!platform.is_playing("m0"));
        engine.destroy().unwrap();
    }

    #[test]
    fn test_missing_mount_rejected() {
        let platform = SimulatedPlatform::new();
        platform.remove_mount("m1");
        let (n, _rx) = notifier();
        let result = platform.create("m1", PlayerOptions::for_clip("x", false, false, 0.0), n);
        assert!(matches!(result, Err(EngineError::MountMissing(_))));
        assert!(platform.calls("m1").is_empty());
    }

    #[test]
    fn test_scripted_positions_and_destroy() {
        let platform = SimulatedPlatform::new();
        let (n, _rx) = notifier();
        let mut engine = platform
            .create("m2", PlayerOptions::for_clip("x", false, false, 0.0), n)
            .unwrap();
        platform.fire_ready("m2");
        platform.script_positions("m2", [5.0, 6.0]);
        assert_eq!(engine.current_time().unwrap(), 5.0);
        assert_eq!(engine.current_time().unwrap(), 6.0);
        assert_eq!(engine.current_time().unwrap(), 0.0);

        assert_eq!(platform.live_count(), 1);
        engine.destroy().unwrap();
        assert_eq!(platform.live_count(), 0);
        assert_eq!(engine.destroy(), Err(EngineError::Destroyed));
        assert_eq!(engine.play(), Err(EngineError::Destroyed));
    }
}
