//! Weak session handles: leak detection without extending wrapper lifetime.

use crate::reaper::ReclamationQueue;
use crate::session::guard::{SessionGuard, SessionId};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Liveness token owned by a [`WriteSession`](crate::session::WriteSession).
///
/// Handles only ever hold a `Weak` to it, so they can observe the wrapper's
/// disappearance without keeping it alive.
#[derive(Debug)]
pub struct SessionAnchor {
    session_id: SessionId,
}

impl SessionAnchor {
    pub fn new(session_id: SessionId) -> Arc<Self> {
        Arc::new(Self { session_id })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

/// Tracking record that links a client-visible session wrapper to the guard
/// needed to dispose it.
pub struct WeakSessionHandle {
    session_id: SessionId,
    wrapper: Weak<SessionAnchor>,
    guard: Arc<SessionGuard>,
    queue: Weak<ReclamationQueue>,
}

impl WeakSessionHandle {
    pub(crate) fn new(
        anchor: &Arc<SessionAnchor>,
        guard: Arc<SessionGuard>,
        queue: Weak<ReclamationQueue>,
    ) -> Self {
        Self {
            session_id: guard.id(),
            wrapper: Arc::downgrade(anchor),
            guard,
            queue,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether the client-visible wrapper still exists.
    pub fn is_wrapper_alive(&self) -> bool {
        self.wrapper.strong_count() > 0
    }

    /// Consume the handle, yielding the guard to dispose.
    pub fn into_guard(self) -> Arc<SessionGuard> {
        self.guard
    }

    /// Place the handle on its reclamation queue. Without a queue the guard
    /// is disposed on the spot.
    pub(crate) fn enqueue(self) {
        match self.queue.upgrade() {
            Some(queue) => queue.enqueue(self),
            None => {
                warn!(
                    session_id = %self.session_id,
                    "Reclamation queue gone, disposing abandoned session inline"
                );
                self.guard.dispose();
            }
        }
    }

    /// Drop the registration without reclaiming (the session was closed).
    pub(crate) fn discard(self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.unregister();
        }
    }
}

impl fmt::Debug for WeakSessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSessionHandle")
            .field("session_id", &self.session_id)
            .field("wrapper_alive", &self.is_wrapper_alive())
            .finish()
    }
}
