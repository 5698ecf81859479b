//! Client-visible write session.

use crate::error::SessionError;
use crate::session::guard::{SessionGuard, SessionId};
use crate::session::handle::{SessionAnchor, WeakSessionHandle};
use crate::session::native::Resource;
use crate::session::state::SessionState;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Exclusive write session handed to callers by
/// [`ApplicationContext::create_session`](crate::engine::ApplicationContext::create_session).
///
/// Close it explicitly, or use
/// [`ApplicationContext::with_session`](crate::engine::ApplicationContext::with_session).
/// A session dropped while still open is handed to the leak reaper, which
/// disposes it asynchronously.
pub struct WriteSession {
    guard: Arc<SessionGuard>,
    anchor: Option<Arc<SessionAnchor>>,
    handle: Option<WeakSessionHandle>,
    application: String,
}

impl WriteSession {
    pub(crate) fn new(
        guard: Arc<SessionGuard>,
        anchor: Arc<SessionAnchor>,
        handle: WeakSessionHandle,
        application: String,
    ) -> Self {
        Self {
            guard,
            anchor: Some(anchor),
            handle: Some(handle),
            application,
        }
    }

    pub fn id(&self) -> SessionId {
        self.guard.id()
    }

    pub fn state(&self) -> SessionState {
        self.guard.state()
    }

    /// Class name of the application this session belongs to.
    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn find(&self, id: &str) -> Result<Option<Resource>, SessionError> {
        self.guard.find(id)
    }

    pub fn resolve(&self, name: &str) -> Result<Option<String>, SessionError> {
        self.guard.resolve(name)
    }

    pub fn modify(&self, resource: Resource) -> Result<(), SessionError> {
        self.guard.modify(resource)
    }

    pub fn delete(&self, id: &str) -> Result<bool, SessionError> {
        self.guard.delete(id)
    }

    pub fn query(&self, expression: &str) -> Result<Vec<Resource>, SessionError> {
        self.guard.query(expression)
    }

    pub fn save_changes(&self) -> Result<(), SessionError> {
        self.guard.save_changes()
    }

    pub fn discard_changes(&self) -> Result<(), SessionError> {
        self.guard.discard_changes()
    }

    /// Close the session. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), SessionError> {
        let result = self.guard.close();
        if let Some(handle) = self.handle.take() {
            handle.discard();
        }
        result
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        drop(self.anchor.take());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.guard.is_released() {
            handle.discard();
        } else {
            debug!(
                session_id = %self.guard.id(),
                application = %self.application,
                "Write session dropped without close, queued for reclamation"
            );
            handle.enqueue();
        }
    }
}

impl fmt::Debug for WriteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSession")
            .field("id", &self.guard.id())
            .field("state", &self.guard.state())
            .field("application", &self.application)
            .finish()
    }
}
