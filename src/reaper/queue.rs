//! Reclamation queue
//!
//! Carries handles of abandoned sessions from dropping threads to the leak
//! reaper. The blocking wait and its interruption share one mutex, so a stop
//! request issued between the reaper's flag check and its wait is never lost.

use crate::session::{SessionAnchor, SessionGuard, WeakSessionHandle};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Why a blocking wait returned without a handle.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("reclamation wait interrupted")]
    Interrupted,

    #[error("reclamation source failed: {0}")]
    Fatal(String),
}

/// Blocking source of reclaimable handles consumed by the leak reaper.
pub trait ReclamationSource: Send + Sync {
    /// Block until a handle is available or the wait is interrupted.
    fn wait(&self) -> Result<WeakSessionHandle, WaitError>;

    /// Wake a blocked `wait` with [`WaitError::Interrupted`]. An interrupt
    /// issued while nobody waits is delivered to the next `wait`.
    fn interrupt(&self);
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Handles registered and not yet consumed or discarded
    pub tracked: usize,
    /// Handles waiting for the reaper
    pub pending: usize,
    /// Handles handed out for disposal
    pub reclaimed: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WeakSessionHandle>,
    interrupted: bool,
}

/// The shared reclamation queue.
#[derive(Default)]
pub struct ReclamationQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    tracked: AtomicUsize,
    reclaimed: AtomicU64,
}

impl ReclamationQueue {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a session for leak tracking.
    pub fn register(
        self: &Arc<Self>,
        anchor: &Arc<SessionAnchor>,
        guard: Arc<SessionGuard>,
    ) -> WeakSessionHandle {
        self.tracked.fetch_add(1, Ordering::AcqRel);
        WeakSessionHandle::new(anchor, guard, Arc::downgrade(self))
    }

    pub(crate) fn enqueue(&self, handle: WeakSessionHandle) {
        trace!(session_id = %handle.session_id(), "Handle queued for reclamation");
        let mut state = self.state.lock();
        state.pending.push_back(handle);
        self.available.notify_one();
    }

    pub(crate) fn unregister(&self) {
        self.release_tracked(1);
    }

    /// Take the next pending handle without blocking.
    pub fn poll(&self) -> Option<WeakSessionHandle> {
        let handle = self.state.lock().pending.pop_front()?;
        self.consumed(1);
        Some(handle)
    }

    /// Take every pending handle without blocking.
    pub fn drain(&self) -> Vec<WeakSessionHandle> {
        let drained: Vec<_> = self.state.lock().pending.drain(..).collect();
        self.consumed(drained.len());
        drained
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            tracked: self.tracked.load(Ordering::Acquire),
            pending: self.state.lock().pending.len(),
            reclaimed: self.reclaimed.load(Ordering::Acquire),
        }
    }

    fn consumed(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.release_tracked(count);
        self.reclaimed.fetch_add(count as u64, Ordering::AcqRel);
    }

    fn release_tracked(&self, count: usize) {
        let _ = self
            .tracked
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tracked| {
                Some(tracked.saturating_sub(count))
            });
    }
}

impl ReclamationSource for ReclamationQueue {
    fn wait(&self) -> Result<WeakSessionHandle, WaitError> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                state.interrupted = false;
                return Err(WaitError::Interrupted);
            }
            if let Some(handle) = state.pending.pop_front() {
                drop(state);
                self.consumed(1);
                return Ok(handle);
            }
            self.available.wait(&mut state);
        }
    }

    fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        self.available.notify_all();
    }
}
