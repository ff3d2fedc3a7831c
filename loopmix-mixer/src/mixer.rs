//! Mixer assembly
//!
//! Wires the store, the engine library gate, the event bus, the transport
//! and one controller task per track slot. Owns the controllers: dropping
//! the mixer aborts them, [`Mixer::shutdown`] tears them down cleanly.

use std::sync::Arc;

use chrono::Utc;
use loopmix_common::config::MixerConfig;
use loopmix_common::events::{EventBus, MixerEvent};
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{MixerState, TrackId, TRACK_COUNT};
use crate::playback::{EngineFactory, LibraryGate, TrackController};
use crate::source::VideoSource;
use crate::store::MixerStore;
use crate::transport::Transport;

pub struct Mixer {
    store: MixerStore,
    events: EventBus,
    gate: Arc<LibraryGate>,
    transport: Transport,
    controllers: Vec<TrackController>,
}

impl Mixer {
    /// Build a mixer with a fresh initial state
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &MixerConfig,
        factory: Arc<dyn EngineFactory>,
        source: Arc<dyn VideoSource>,
    ) -> Self {
        let initial = MixerState::from_config(config, &mut rand::thread_rng());
        Self::with_state(config, initial, factory, source)
    }

    /// Build a mixer around an explicit initial state
    pub fn with_state(
        config: &MixerConfig,
        initial: MixerState,
        factory: Arc<dyn EngineFactory>,
        source: Arc<dyn VideoSource>,
    ) -> Self {
        let store = MixerStore::new(initial);
        let events = EventBus::new(config.event_capacity);
        let gate = Arc::new(LibraryGate::new());

        {
            let store = store.clone();
            let events = events.clone();
            gate.on_ready(move || {
                if store.set_api_ready(true) {
                    events.emit_lossy(MixerEvent::ApiReady { timestamp: Utc::now() });
                }
            });
        }

        let controllers = (0..TRACK_COUNT)
            .map(|id| {
                TrackController::spawn(
                    id,
                    store.clone(),
                    Arc::clone(&factory),
                    events.clone(),
                    config.poll_interval(),
                )
            })
            .collect();

        info!(
            tracks = TRACK_COUNT,
            poll_interval_ms = config.poll_interval_ms,
            "mixer started"
        );

        Self {
            transport: Transport::new(store.clone(), events.clone(), source),
            store,
            events,
            gate,
            controllers,
        }
    }

    pub fn store(&self) -> &MixerStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn gate(&self) -> &Arc<LibraryGate> {
        &self.gate
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Load the engine library and open the gate
    ///
    /// The simulated library has nothing to fetch, so loading completes
    /// immediately. Returns false if loading had already been started.
    pub fn load_engine_library(&self) -> bool {
        if !self.gate.begin_loading() {
            return false;
        }
        self.gate.mark_ready();
        true
    }

    /// Randomize the loop start of one track (see [`TrackController::randomize_start`])
    pub async fn randomize_start(&self, id: TrackId) -> Result<Option<f64>> {
        match self.controllers.get(id) {
            Some(controller) => controller.randomize_start().await,
            None => Ok(None),
        }
    }

    /// Empty a track slot
    pub fn clear_track(&self, id: TrackId) -> bool {
        let changed = self.store.clear_track(id);
        if changed {
            self.events.emit_lossy(MixerEvent::TrackCleared {
                track_id: id,
                timestamp: Utc::now(),
            });
        }
        changed
    }

    /// Tear down every engine instance and stop the controller tasks
    pub async fn shutdown(self) -> Result<()> {
        let mut first_error = None;
        for controller in self.controllers {
            let track_id = controller.track_id();
            if let Err(e) = controller.shutdown().await {
                warn!(track_id, error = %e, "controller shutdown failed");
                first_error.get_or_insert(e);
            }
        }
        info!("mixer stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
