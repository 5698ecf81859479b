//! State shared between a registry and the contexts it loaded.

use crate::config::ReaperConfig;
use crate::engine::driver::EngineDriver;
use crate::engine::state::EngineState;
use crate::error::EngineError;
use crate::reaper::{LeakReaper, ReclamationQueue};
use crate::session::{SessionAnchor, SessionGuard, WeakSessionHandle};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a registry; contexts carry the id of the registry that loaded them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        EngineId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

pub(crate) struct EngineRuntime {
    id: EngineId,
    state: RwLock<EngineState>,
    offline: AtomicBool,
    driver: Arc<dyn EngineDriver>,
    queue: Arc<ReclamationQueue>,
    reaper: LeakReaper,
}

impl EngineRuntime {
    pub(crate) fn new(driver: Arc<dyn EngineDriver>, state: EngineState, reaper: &ReaperConfig) -> Self {
        Self {
            id: EngineId::next(),
            state: RwLock::new(state),
            offline: AtomicBool::new(false),
            driver,
            queue: ReclamationQueue::shared(),
            reaper: LeakReaper::new(reaper.clone()),
        }
    }

    pub(crate) fn id(&self) -> EngineId {
        self.id
    }

    pub(crate) fn driver(&self) -> &Arc<dyn EngineDriver> {
        &self.driver
    }

    pub(crate) fn queue(&self) -> &Arc<ReclamationQueue> {
        &self.queue
    }

    pub(crate) fn reaper(&self) -> &LeakReaper {
        &self.reaper
    }

    pub(crate) fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub(crate) fn is_online(&self) -> bool {
        self.state().is_online() && !self.offline.load(Ordering::Acquire) && self.driver.is_online()
    }

    pub(crate) fn ensure_online(&self) -> Result<(), EngineError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(EngineError::Offline(self.state()))
        }
    }

    /// Launch the reaper unless the engine has left `Started`.
    ///
    /// The state read lock is held across the launch, so a concurrent
    /// shutdown either sees the new worker and terminates it, or the launch
    /// sees `Shutdown` and is refused.
    pub(crate) fn ensure_reaper(&self) -> Result<(), EngineError> {
        let state = self.state.read();
        if !state.is_online() {
            return Err(EngineError::Offline(*state));
        }
        self.reaper.launch(Arc::clone(&self.queue) as _)
    }

    pub(crate) fn track(&self, anchor: &Arc<SessionAnchor>, guard: Arc<SessionGuard>) -> WeakSessionHandle {
        self.queue.register(anchor, guard)
    }
}
