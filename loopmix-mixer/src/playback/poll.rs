//! Loop enforcement poll timer
//!
//! One timer per track controller. The timer itself knows nothing about the
//! engine: it only sends generation-tagged [`LoopInput::PollTick`] messages
//! into the controller's input channel, and the controller does the position
//! check on its own task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use super::controller::LoopInput;

/// Loop window captured when polling started
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopWindow {
    pub start: f64,
    pub end: f64,
}

impl LoopWindow {
    pub fn new(start: f64, length: f64) -> Self {
        Self { start, end: start + length }
    }

    /// Position is outside `[start, end)`
    pub fn needs_correction(&self, position: f64) -> bool {
        position >= self.end || position < self.start
    }
}

/// Restartable, cancellable periodic tick source
#[derive(Debug)]
pub struct PollTimer {
    cadence: Duration,
    tx: mpsc::UnboundedSender<LoopInput>,
    task: Option<JoinHandle<()>>,
    generation: u64,
    window: Option<LoopWindow>,
}

impl PollTimer {
    pub fn new(cadence: Duration, tx: mpsc::UnboundedSender<LoopInput>) -> Self {
        Self {
            cadence,
            tx,
            task: None,
            generation: 0,
            window: None,
        }
    }

    /// Start ticking for `window`, replacing any running poll
    ///
    /// First tick fires one cadence after the call.
    pub fn start(&mut self, window: LoopWindow) {
        self.cancel();
        self.window = Some(window);

        let generation = self.generation;
        let cadence = self.cadence;
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + cadence, cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(LoopInput::PollTick { generation }).is_err() {
                    break;
                }
            }
        }));
        trace!(generation, start = window.start, end = window.end, "poll started");
    }

    /// Stop ticking; safe to call any number of times
    ///
    /// Ticks already queued carry the old generation and are ignored.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            trace!(generation = self.generation, "poll cancelled");
        }
        self.generation += 1;
        self.window = None;
    }

    /// Whether `generation` belongs to the running poll
    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && generation == self.generation
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Window of the running poll
    pub fn window(&self) -> Option<LoopWindow> {
        self.window
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
