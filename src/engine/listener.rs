//! Lifecycle listeners and their notification policy.

use crate::engine::context::ApplicationInfo;
use crate::engine::state::EngineState;
use crate::error::EngineError;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Application lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationEvent {
    Loaded,
    Disposed,
}

impl ApplicationEvent {
    fn is_startup(self) -> bool {
        self == ApplicationEvent::Loaded
    }
}

/// Receives engine and application state changes synchronously.
///
/// Failures on startup notifications (engine entering `Started`, application
/// `Loaded`) abort that operation. Failures on stop notifications are logged.
pub trait LifecycleListener: Send + Sync {
    fn engine_state_changed(&self, _from: EngineState, _to: EngineState) -> anyhow::Result<()> {
        Ok(())
    }

    fn application_state_changed(
        &self,
        _application: &ApplicationInfo,
        _event: ApplicationEvent,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl ListenerSet {
    pub(crate) fn register(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn deregister(&self, listener: &Arc<dyn LifecycleListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Snapshot so callbacks run without the listener lock held.
    fn snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn engine_changed(&self, from: EngineState, to: EngineState) -> Result<(), EngineError> {
        let startup = to == EngineState::Started;
        for listener in self.snapshot() {
            if let Err(err) = listener.engine_state_changed(from, to) {
                if startup {
                    return Err(EngineError::Listener(format!("{:#}", err)));
                }
                warn!(from = %from, to = %to, error = %format!("{:#}", err), "Lifecycle listener failed");
            }
        }
        Ok(())
    }

    pub(crate) fn application_changed(
        &self,
        application: &ApplicationInfo,
        event: ApplicationEvent,
    ) -> Result<(), EngineError> {
        for listener in self.snapshot() {
            if let Err(err) = listener.application_state_changed(application, event) {
                if event.is_startup() {
                    return Err(EngineError::Listener(format!("{:#}", err)));
                }
                warn!(
                    application = %application.class_name,
                    event = ?event,
                    error = %format!("{:#}", err),
                    "Lifecycle listener failed"
                );
            }
        }
        Ok(())
    }
}
