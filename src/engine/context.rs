//! Application contexts
//!
//! A context is one loaded application. It hands out at most one open write
//! session per thread and tracks those sessions in a slot table keyed by
//! thread id. Each slot keeps a weak reference to the session's wrapper, so a
//! slot whose wrapper was dropped without close is recognized as abandoned and
//! replaced on the next `create_session` from that thread.

use crate::engine::driver::{ApplicationBackend, LoadedApplication};
use crate::engine::runtime::{EngineId, EngineRuntime};
use crate::error::EngineError;
use crate::session::{DisposeListener, SessionAnchor, SessionGuard, SessionId, WriteSession};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Descriptive data about a loaded application.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationInfo {
    pub class_name: String,
    pub name: String,
    pub loaded_at: DateTime<Utc>,
}

struct SessionSlot {
    guard: Arc<SessionGuard>,
    wrapper: Weak<SessionAnchor>,
}

impl SessionSlot {
    fn is_abandoned(&self) -> bool {
        self.wrapper.strong_count() == 0
    }
}

type SlotTable = Mutex<HashMap<ThreadId, SessionSlot>>;

/// A loaded application.
pub struct ApplicationContext {
    info: ApplicationInfo,
    runtime: Arc<EngineRuntime>,
    backend: Arc<dyn ApplicationBackend>,
    slots: Arc<SlotTable>,
    disposed: AtomicBool,
}

impl ApplicationContext {
    pub(crate) fn new(runtime: Arc<EngineRuntime>, class_name: &str, loaded: LoadedApplication) -> Self {
        Self {
            info: ApplicationInfo {
                class_name: class_name.to_string(),
                name: loaded.name,
                loaded_at: Utc::now(),
            },
            runtime,
            backend: loaded.backend,
            slots: Arc::new(Mutex::new(HashMap::new())),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn application_class_name(&self) -> &str {
        &self.info.class_name
    }

    pub fn application_name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &ApplicationInfo {
        &self.info
    }

    /// Registry that loaded this context.
    pub fn engine_id(&self) -> EngineId {
        self.runtime.id()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Sessions that are still open, across all threads.
    pub fn active_sessions(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| !slot.guard.is_released())
            .count()
    }

    /// Open a write session for the calling thread.
    ///
    /// Fails with [`EngineError::SessionAlreadyActive`] while this thread
    /// still holds an open session whose wrapper is alive. A previous session
    /// whose wrapper was dropped without close is disposed first.
    pub fn create_session(&self) -> Result<WriteSession, EngineError> {
        self.runtime.ensure_online()?;
        if self.is_disposed() {
            return Err(EngineError::ContextDisposed(self.info.class_name.clone()));
        }

        let thread = thread::current().id();
        let abandoned = {
            let mut slots = self.slots.lock();
            let status = slots
                .get(&thread)
                .map(|slot| (slot.is_abandoned(), slot.guard.is_released()));
            match status {
                Some((false, false)) => {
                    return Err(EngineError::SessionAlreadyActive {
                        application: self.info.class_name.clone(),
                    });
                }
                Some(_) => slots.remove(&thread),
                None => None,
            }
        };
        if let Some(slot) = abandoned {
            debug!(
                session_id = %slot.guard.id(),
                application = %self.info.class_name,
                "Disposing abandoned session before opening a new one"
            );
            slot.guard.dispose();
        }

        let native = self.backend.open_session()?;
        let guard = Arc::new(SessionGuard::new(native, Some(self.release_slot(thread))));
        let anchor = SessionAnchor::new(guard.id());
        if let Err(err) = self.claim_slot(thread, &guard, &anchor) {
            debug!(
                session_id = %guard.id(),
                application = %self.info.class_name,
                error = %err,
                "Discarding session opened during disposal"
            );
            guard.dispose();
            return Err(err);
        }
        let handle = self.runtime.track(&anchor, Arc::clone(&guard));

        debug!(
            session_id = %guard.id(),
            application = %self.info.class_name,
            "Write session opened"
        );
        Ok(WriteSession::new(guard, anchor, handle, self.info.class_name.clone()))
    }

    /// Run `work` inside a session that is closed on every exit path,
    /// including errors and panics.
    ///
    /// A close failure after successful work is returned; after failed work
    /// the work's error wins and the close failure is logged.
    pub fn with_session<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&WriteSession) -> Result<T, E>,
        E: From<EngineError>,
    {
        let mut scope = ScopedSession(self.create_session()?);
        let result = work(&scope.0);
        let closed = scope.0.close();
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(E::from(EngineError::from(err))),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(
                    application = %self.info.class_name,
                    error = %close_err,
                    "Failed to close session after failed work"
                );
                Err(err)
            }
        }
    }

    /// Dispose every session and release the backend. Idempotent.
    pub(crate) fn dispose(&self) -> Result<(), EngineError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let slots: Vec<SessionSlot> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.guard.dispose();
        }
        self.backend.release()
    }

    /// Record a freshly opened session in the slot table.
    ///
    /// `dispose` raises the disposed flag before draining the table under the
    /// same lock, so a slot inserted here is either drained by it or refused.
    fn claim_slot(
        &self,
        thread: ThreadId,
        guard: &Arc<SessionGuard>,
        anchor: &Arc<SessionAnchor>,
    ) -> Result<(), EngineError> {
        {
            let mut slots = self.slots.lock();
            if self.is_disposed() {
                return Err(EngineError::ContextDisposed(self.info.class_name.clone()));
            }
            self.runtime.ensure_online()?;
            slots.insert(
                thread,
                SessionSlot {
                    guard: Arc::clone(guard),
                    wrapper: Arc::downgrade(anchor),
                },
            );
        }
        self.runtime.ensure_reaper()
    }

    /// Listener that frees the thread's slot once its session is disposed.
    fn release_slot(&self, thread: ThreadId) -> DisposeListener {
        let slots = Arc::downgrade(&self.slots);
        Box::new(move |session_id: SessionId| {
            let Some(slots) = slots.upgrade() else {
                return;
            };
            let mut slots = slots.lock();
            if slots
                .get(&thread)
                .is_some_and(|slot| slot.guard.id() == session_id)
            {
                slots.remove(&thread);
            }
        })
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("class_name", &self.info.class_name)
            .field("name", &self.info.name)
            .field("engine", &self.runtime.id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Closes the session if the scoped work unwinds.
struct ScopedSession(WriteSession);

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Err(err) = self.0.close() {
            warn!(session_id = %self.0.id(), error = %err, "Failed to close scoped session");
        }
    }
}
