//! Track controller task
//!
//! Runs one [`TrackLoop`] on its own tokio task. The task is the only place
//! the loop state machine is touched, so every input for a track (store
//! changes, engine notifications, poll ticks, commands) is processed strictly
//! in arrival order. A pending store change is always applied before the next
//! queued input. Tracks are independent of each other.

use std::sync::Arc;
use std::time::Duration;

use loopmix_common::events::EventBus;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::engine::{EngineFactory, EngineNotification};
use super::track_loop::TrackLoop;
use crate::error::{Error, Result};
use crate::model::TrackId;
use crate::store::MixerStore;

/// Input to a controller task (other than store changes)
#[derive(Debug)]
pub enum LoopInput {
    /// Notification from the engine instance `instance`
    Notification {
        instance: u64,
        notification: EngineNotification,
    },
    /// Poll timer tick
    PollTick { generation: u64 },
    /// Pick a random loop start; replies with the new start, if any
    RandomizeStart { reply: oneshot::Sender<Option<f64>> },
    /// Tear down and exit
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to a running track controller task
///
/// Dropping the handle aborts the task; the engine instance is destroyed
/// either way.
pub struct TrackController {
    track_id: TrackId,
    tx: mpsc::UnboundedSender<LoopInput>,
    task: Option<JoinHandle<()>>,
}

impl TrackController {
    /// Spawn the controller for `track_id` on the current runtime
    pub fn spawn(
        track_id: TrackId,
        store: MixerStore,
        factory: Arc<dyn EngineFactory>,
        events: EventBus,
        poll_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let track_loop = TrackLoop::new(track_id, factory, tx.clone(), events, poll_interval);
        let task = tokio::spawn(run(track_loop, store, rx));
        Self {
            track_id,
            tx,
            task: Some(task),
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Randomize the loop start of this track
    ///
    /// The new start is written to the store before this returns.
    pub async fn randomize_start(&self) -> Result<Option<f64>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopInput::RandomizeStart { reply })
            .map_err(|_| Error::ControllerClosed(self.track_id))?;
        rx.await.map_err(|_| Error::ControllerClosed(self.track_id))
    }

    /// Tear down the engine instance and stop the task
    pub async fn shutdown(mut self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopInput::Shutdown { reply })
            .map_err(|_| Error::ControllerClosed(self.track_id))?;
        rx.await.map_err(|_| Error::ControllerClosed(self.track_id))?;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

impl Drop for TrackController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(mut track_loop: TrackLoop, store: MixerStore, mut rx: mpsc::UnboundedReceiver<LoopInput>) {
    let track_id = track_loop.track_id();
    let mut state_rx = store.subscribe();
    debug!(track_id, mount_id = track_loop.mount_id(), "track controller started");

    let initial = state_rx.borrow_and_update().clone();
    track_loop.on_state(&initial);

    loop {
        tokio::select! {
            // Store changes first: every input sees the latest snapshot
            biased;

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state_rx.borrow_and_update().clone();
                track_loop.on_state(&snapshot);
            }
            input = rx.recv() => {
                let Some(input) = input else {
                    break;
                };
                match input {
                    LoopInput::Notification { instance, notification } => {
                        track_loop.on_notification(instance, notification);
                    }
                    LoopInput::PollTick { generation } => {
                        track_loop.on_poll_tick(generation);
                    }
                    LoopInput::RandomizeStart { reply } => {
                        if state_rx.has_changed().unwrap_or(false) {
                            let snapshot = state_rx.borrow_and_update().clone();
                            track_loop.on_state(&snapshot);
                        }
                        let start = {
                            let mut rng = rand::thread_rng();
                            track_loop.randomize_start(&mut rng)
                        };
                        if let Some(start) = start {
                            store.set_track_start_time(track_id, start);
                        }
                        let _ = reply.send(start);
                    }
                    LoopInput::Shutdown { reply } => {
                        track_loop.teardown();
                        let _ = reply.send(());
                        break;
                    }
                }
            }
        }
    }

    info!(track_id, "track controller stopped");
}
