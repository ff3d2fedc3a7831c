//! Event types for the loopmix event system
//!
//! Provides shared event definitions and the EventBus used by the mixer,
//! its per-track controllers and any attached front end.

mod track_types;

pub use track_types::{EngineOperation, LoopPhase, TransportAction};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Timestamp type carried by every event
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// loopmix event types
///
/// Events are broadcast via EventBus and can be serialized for display or
/// diagnostics. They describe what happened; they never carry commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MixerEvent {
    /// Engine library finished loading; engine instances may now be created
    ApiReady {
        timestamp: Timestamp,
    },

    /// A video was assigned to a track slot
    TrackLoaded {
        track_id: usize,
        video_id: String,
        title: String,
        timestamp: Timestamp,
    },

    /// A track slot was cleared back to empty
    TrackCleared {
        track_id: usize,
        timestamp: Timestamp,
    },

    /// Loop controller moved between lifecycle phases
    ///
    /// Triggers:
    /// - UI: loading / playing indicators per track
    PhaseChanged {
        track_id: usize,
        old_phase: LoopPhase,
        new_phase: LoopPhase,
        timestamp: Timestamp,
    },

    /// Poll tick found the position outside the loop window and seeked back
    LoopCorrected {
        track_id: usize,
        /// Position reported by the engine (seconds)
        position: f64,
        /// Window lower bound the engine was sent back to (seconds)
        start_time: f64,
        /// Window upper bound, exclusive (seconds)
        end_time: f64,
        timestamp: Timestamp,
    },

    /// Engine reported end of clip and the loop was restarted
    LoopRestarted {
        track_id: usize,
        start_time: f64,
        timestamp: Timestamp,
    },

    /// User-triggered start randomization picked a new window
    StartRandomized {
        track_id: usize,
        start_time: f64,
        duration: f64,
        timestamp: Timestamp,
    },

    /// Global transport action applied
    TransportChanged {
        action: TransportAction,
        is_global_playing: bool,
        timestamp: Timestamp,
    },

    /// An engine call failed and was absorbed
    ///
    /// NOTE: Poll-tick failures are not reported here (they are expected
    /// noise at the poll cadence); only command failures are.
    EngineFault {
        track_id: usize,
        operation: EngineOperation,
        message: String,
        timestamp: Timestamp,
    },
}

impl MixerEvent {
    /// Track the event refers to, if any
    pub fn track_id(&self) -> Option<usize> {
        match self {
            MixerEvent::TrackLoaded { track_id, .. }
            | MixerEvent::TrackCleared { track_id, .. }
            | MixerEvent::PhaseChanged { track_id, .. }
            | MixerEvent::LoopCorrected { track_id, .. }
            | MixerEvent::LoopRestarted { track_id, .. }
            | MixerEvent::StartRandomized { track_id, .. }
            | MixerEvent::EngineFault { track_id, .. } => Some(*track_id),
            MixerEvent::ApiReady { .. } | MixerEvent::TransportChanged { .. } => None,
        }
    }

    /// Short event name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            MixerEvent::ApiReady { .. } => "ApiReady",
            MixerEvent::TrackLoaded { .. } => "TrackLoaded",
            MixerEvent::TrackCleared { .. } => "TrackCleared",
            MixerEvent::PhaseChanged { .. } => "PhaseChanged",
            MixerEvent::LoopCorrected { .. } => "LoopCorrected",
            MixerEvent::LoopRestarted { .. } => "LoopRestarted",
            MixerEvent::StartRandomized { .. } => "StartRandomized",
            MixerEvent::TransportChanged { .. } => "TransportChanged",
            MixerEvent::EngineFault { .. } => "EngineFault",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for mixer-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use loopmix_common::events::{EventBus, MixerEvent};
///
/// let event_bus = EventBus::new(64);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(MixerEvent::ApiReady { timestamp: chrono::Utc::now() });
///
/// assert!(matches!(rx.try_recv(), Ok(MixerEvent::ApiReady { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MixerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity: capacity.max(1) }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MixerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MixerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
