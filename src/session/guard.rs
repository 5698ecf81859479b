//! Session guard: state machine and circuit breaker over a native session.

use crate::error::SessionError;
use crate::session::native::{NativeSession, Resource};
use crate::session::state::SessionState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Callback run exactly once when a guard releases its native session.
pub type DisposeListener = Box<dyn FnOnce(SessionId) + Send>;

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SessionId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

struct GuardInner {
    state: SessionState,
    native: Option<Box<dyn NativeSession>>,
}

/// Wraps one native session and makes every externally visible operation
/// idempotent and circuit-broken.
///
/// The guard is shared between the owning thread and the reaper thread. All
/// state transitions happen under the guard's own lock; the native `close`
/// and the dispose listener run after the lock has been released.
///
/// Native data operations (`find`, `modify`, `save_changes` and the rest) run
/// while the lock is held. A `close` or `dispose` from another thread, such as
/// the reaper or an engine shutdown, therefore blocks until an in-flight
/// native call returns; it is never cancelled.
pub struct SessionGuard {
    id: SessionId,
    inner: Mutex<GuardInner>,
    on_dispose: Mutex<Option<DisposeListener>>,
}

impl SessionGuard {
    /// Wrap a native session. The guard starts `Active`.
    pub fn new(native: Box<dyn NativeSession>, on_dispose: Option<DisposeListener>) -> Self {
        let id = SessionId::next();
        debug!(session_id = %id, "Session guard created");
        Self {
            id,
            inner: Mutex::new(GuardInner {
                state: SessionState::Active,
                native: Some(native),
            }),
            on_dispose: Mutex::new(on_dispose),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// True once `close` or `dispose` has claimed the guard.
    pub fn is_released(&self) -> bool {
        self.state().is_released()
    }

    pub fn find(&self, id: &str) -> Result<Option<Resource>, SessionError> {
        self.with_active("find", |native| native.find(id))
    }

    pub fn resolve(&self, name: &str) -> Result<Option<String>, SessionError> {
        self.with_active("resolve", |native| native.resolve(name))
    }

    pub fn modify(&self, resource: Resource) -> Result<(), SessionError> {
        self.with_active("modify", |native| native.modify(resource))
    }

    pub fn delete(&self, id: &str) -> Result<bool, SessionError> {
        self.with_active("delete", |native| native.delete(id))
    }

    pub fn query(&self, expression: &str) -> Result<Vec<Resource>, SessionError> {
        self.with_active("query", |native| native.query(expression))
    }

    /// Commit pending changes and move to `Completed`.
    ///
    /// A native failure leaves the session `Active` so the caller can still
    /// discard.
    pub fn save_changes(&self) -> Result<(), SessionError> {
        self.complete("save_changes", |native| native.save_changes())
    }

    /// Drop pending changes and move to `Completed`.
    pub fn discard_changes(&self) -> Result<(), SessionError> {
        self.complete("discard_changes", |native| native.discard_changes())
    }

    /// Release the native session on behalf of the owner.
    ///
    /// Only the first call has an effect. A native close failure is returned,
    /// but the guard still ends `Disposed` and the listener still runs.
    pub fn close(&self) -> Result<(), SessionError> {
        let Some((mut native, listener)) = self.claim() else {
            trace!(session_id = %self.id, "Session already released, close ignored");
            return Ok(());
        };
        let result = native.close();
        drop(native);
        self.settle(listener);
        debug!(session_id = %self.id, ok = result.is_ok(), "Session closed");
        result
    }

    /// Release the native session on behalf of the runtime (reaper, shutdown).
    ///
    /// Same contract as [`close`](Self::close) except that native failures are
    /// logged and swallowed.
    pub fn dispose(&self) {
        let Some((mut native, listener)) = self.claim() else {
            trace!(session_id = %self.id, "Session already released, dispose ignored");
            return;
        };
        if let Err(err) = native.close() {
            warn!(
                session_id = %self.id,
                error = %err,
                "Native session close failed during disposal"
            );
        }
        drop(native);
        self.settle(listener);
        debug!(session_id = %self.id, "Session disposed");
    }

    fn with_active<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn NativeSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut inner = self.inner.lock();
        let native = Self::active_native(&mut *inner, self.id, operation)?;
        f(native)
    }

    fn complete(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn NativeSession) -> Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let native = Self::active_native(&mut *inner, self.id, operation)?;
        f(native)?;
        inner.state = SessionState::Completed;
        debug!(session_id = %self.id, operation, "Session completed");
        Ok(())
    }

    fn active_native<'a>(
        inner: &'a mut GuardInner,
        id: SessionId,
        operation: &'static str,
    ) -> Result<&'a mut (dyn NativeSession + 'static), SessionError> {
        if !inner.state.is_active() {
            debug!(session_id = %id, operation, state = %inner.state, "Rejected call on inactive session");
            return Err(SessionError::Inactive(inner.state));
        }
        match inner.native.as_mut() {
            Some(native) => Ok(native.as_mut()),
            None => Err(SessionError::Inactive(SessionState::Disposed)),
        }
    }

    /// Move to `Closed` and take the native session plus listener. Returns
    /// `None` if another caller already claimed the guard.
    fn claim(&self) -> Option<(Box<dyn NativeSession>, Option<DisposeListener>)> {
        let native = {
            let mut inner = self.inner.lock();
            if inner.state.is_released() {
                return None;
            }
            inner.state = SessionState::Closed;
            inner.native.take()?
        };
        let listener = self.on_dispose.lock().take();
        Some((native, listener))
    }

    fn settle(&self, listener: Option<DisposeListener>) {
        self.inner.lock().state = SessionState::Disposed;
        if let Some(listener) = listener {
            listener(self.id);
        }
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
