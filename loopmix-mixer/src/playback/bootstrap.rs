//! Engine library gate
//!
//! The player library is loaded once per process. Until it reports ready no
//! engine instance may be constructed; anything that needs it registers a
//! callback which runs exactly once when the library becomes ready.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

/// Gate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NotStarted,
    Loading,
    Ready,
}

type ReadyCallback = Box<dyn FnOnce() + Send>;

struct GateInner {
    state: GateState,
    pending: Vec<ReadyCallback>,
}

/// One-shot "engine library ready" gate
pub struct LibraryGate {
    inner: Mutex<GateInner>,
}

impl Default for LibraryGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: GateState::NotStarted,
                pending: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> GateState {
        self.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == GateState::Ready
    }

    /// Claim the load; true only for the first caller
    pub fn begin_loading(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != GateState::NotStarted {
            return false;
        }
        inner.state = GateState::Loading;
        debug!("engine library loading");
        true
    }

    /// Run `callback` once the library is ready (immediately if it already is)
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        let mut inner = self.lock();
        if inner.state == GateState::Ready {
            drop(inner);
            callback();
        } else {
            inner.pending.push(Box::new(callback));
        }
    }

    /// Library finished loading: drain the queued callbacks
    ///
    /// Returns the number of callbacks run; a second call runs nothing.
    pub fn mark_ready(&self) -> usize {
        let pending = {
            let mut inner = self.lock();
            if inner.state == GateState::Ready {
                return 0;
            }
            inner.state = GateState::Ready;
            std::mem::take(&mut inner.pending)
        };
        let count = pending.len();
        info!(callbacks = count, "engine library ready");
        for callback in pending {
            callback();
        }
        count
    }
}

impl std::fmt::Debug for LibraryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LibraryGate")
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .finish()
    }
}
