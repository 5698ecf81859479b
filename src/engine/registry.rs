//! Engine registry
//!
//! Owns the engine state machine and the table of loaded contexts. The table
//! and the current-context pointer live under one `RwLock`; start and
//! shutdown are serialized by a separate lifecycle mutex. Listeners are
//! notified outside the context lock, so they may query the registry, but
//! they must not call `start` or `shutdown` from a callback.

use crate::config::ReaperConfig;
use crate::engine::context::ApplicationContext;
use crate::engine::discovery::Resolution;
use crate::engine::driver::EngineDriver;
use crate::engine::listener::{ApplicationEvent, LifecycleListener, ListenerSet};
use crate::engine::runtime::{EngineId, EngineRuntime};
use crate::engine::state::EngineState;
use crate::error::EngineError;
use crate::reaper::{LeakReaper, QueueStats};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct ContextTable {
    by_class: HashMap<String, Arc<ApplicationContext>>,
    /// Class names in load order
    order: Vec<String>,
    current: Option<Arc<ApplicationContext>>,
}

impl ContextTable {
    fn insert(&mut self, context: Arc<ApplicationContext>) {
        let class_name = context.application_class_name().to_string();
        self.order.push(class_name.clone());
        self.current = Some(Arc::clone(&context));
        self.by_class.insert(class_name, context);
    }

    /// Remove the entry if it is this exact context.
    fn remove(&mut self, context: &ApplicationContext) -> Option<Arc<ApplicationContext>> {
        let class_name = context.application_class_name();
        let loaded = self.by_class.get(class_name)?;
        if !std::ptr::eq(Arc::as_ptr(loaded), context) {
            return None;
        }
        let removed = self.by_class.remove(class_name);
        self.order.retain(|name| name != class_name);
        self.refresh_current();
        removed
    }

    fn refresh_current(&mut self) {
        self.current = self
            .order
            .last()
            .and_then(|name| self.by_class.get(name))
            .cloned();
    }

    /// Empty the table, most recently loaded first.
    fn drain(&mut self) -> Vec<Arc<ApplicationContext>> {
        self.current = None;
        let mut drained = Vec::with_capacity(self.order.len());
        while let Some(name) = self.order.pop() {
            if let Some(context) = self.by_class.remove(&name) {
                drained.push(context);
            }
        }
        drained
    }

    fn in_load_order(&self) -> Vec<Arc<ApplicationContext>> {
        self.order
            .iter()
            .filter_map(|name| self.by_class.get(name).cloned())
            .collect()
    }
}

/// Registry of loaded applications backed by one engine driver.
pub struct EngineRegistry {
    runtime: Arc<EngineRuntime>,
    lifecycle: Mutex<()>,
    contexts: RwLock<ContextTable>,
    listeners: ListenerSet,
}

impl EngineRegistry {
    /// Registry in state `Available` with default reaper settings.
    pub fn new(driver: Arc<dyn EngineDriver>) -> Self {
        Self::with_config(driver, &ReaperConfig::default())
    }

    pub fn with_config(driver: Arc<dyn EngineDriver>, reaper: &ReaperConfig) -> Self {
        Self::with_state(driver, EngineState::Available, reaper)
    }

    /// Registry for the outcome of a discovery run.
    pub fn from_resolution(resolution: Resolution, reaper: &ReaperConfig) -> Self {
        Self::with_state(resolution.driver, resolution.state, reaper)
    }

    fn with_state(driver: Arc<dyn EngineDriver>, state: EngineState, reaper: &ReaperConfig) -> Self {
        let runtime = Arc::new(EngineRuntime::new(driver, state, reaper));
        debug!(engine = %runtime.id(), driver = runtime.driver().name(), state = %state, "Engine registry created");
        Self {
            runtime,
            lifecycle: Mutex::new(()),
            contexts: RwLock::new(ContextTable::default()),
            listeners: ListenerSet::default(),
        }
    }

    pub fn id(&self) -> EngineId {
        self.runtime.id()
    }

    pub fn driver_name(&self) -> &str {
        self.runtime.driver().name()
    }

    pub fn state(&self) -> EngineState {
        self.runtime.state()
    }

    /// Whether sessions can currently be opened.
    pub fn is_online(&self) -> bool {
        self.runtime.is_online()
    }

    /// Force the engine offline (or back online) without changing its state.
    pub fn set_offline(&self, offline: bool) {
        info!(engine = %self.id(), offline, "Engine connectivity override changed");
        self.runtime.set_offline(offline);
    }

    /// Start the engine. Idempotent once started.
    ///
    /// A listener failure on the `Started` notification aborts the start: the
    /// driver is shut down again and the state stays where it was.
    pub fn start(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock();
        let from = self.state();
        match from {
            EngineState::Started => return Ok(()),
            EngineState::Available => {}
            EngineState::Undefined | EngineState::Unavailable => {
                self.runtime.driver().start()?;
                return Err(EngineError::NotActive(from));
            }
            EngineState::Shutdown => return Err(EngineError::NotActive(from)),
        }

        self.runtime.driver().start()?;
        if let Err(err) = self.listeners.engine_changed(from, EngineState::Started) {
            warn!(engine = %self.id(), error = %err, "Engine start vetoed by listener");
            if let Err(shutdown_err) = self.runtime.driver().shutdown() {
                warn!(engine = %self.id(), error = %shutdown_err, "Driver shutdown after vetoed start failed");
            }
            return Err(err);
        }
        self.runtime.set_state(EngineState::Started);
        info!(engine = %self.id(), driver = self.driver_name(), "Application engine started");
        Ok(())
    }

    /// Shut the engine down. Idempotent.
    ///
    /// Every context is disposed (failures are logged), queued handles are
    /// reclaimed, the reaper is stopped and the driver shut down. The state is
    /// `Shutdown` afterwards even if the driver reports a failure, which is
    /// then returned.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock();
        let from = self.state();
        if from == EngineState::Shutdown {
            return Ok(());
        }

        let contexts = {
            let mut table = self.contexts.write();
            self.runtime.set_state(EngineState::Shutdown);
            table.drain()
        };
        for context in contexts {
            if let Err(err) = context.dispose() {
                warn!(
                    application = %context.application_class_name(),
                    error = %err,
                    "Failed to dispose application context during shutdown"
                );
            }
            let _ = self
                .listeners
                .application_changed(context.info(), ApplicationEvent::Disposed);
        }

        let pending = self.runtime.queue().drain();
        if !pending.is_empty() {
            debug!(count = pending.len(), "Reclaiming queued sessions at shutdown");
        }
        for handle in pending {
            handle.into_guard().dispose();
        }
        self.runtime.reaper().terminate();

        let driver_result = self.runtime.driver().shutdown();
        if let Err(err) = &driver_result {
            warn!(engine = %self.id(), error = %err, "Engine driver shutdown failed");
        }
        let _ = self.listeners.engine_changed(from, EngineState::Shutdown);
        info!(engine = %self.id(), "Application engine shut down");
        driver_result
    }

    /// Load an application and make it the current context.
    ///
    /// The driver loads the application without holding the context table
    /// lock; the duplicate check is repeated before the context is inserted.
    pub fn load(&self, class_name: &str) -> Result<Arc<ApplicationContext>, EngineError> {
        {
            let table = self.contexts.read();
            self.require_started()?;
            if table.by_class.contains_key(class_name) {
                return Err(EngineError::AlreadyLoaded(class_name.to_string()));
            }
        }

        let loaded = self.runtime.driver().load_application(class_name)?;
        let context = Arc::new(ApplicationContext::new(
            Arc::clone(&self.runtime),
            class_name,
            loaded,
        ));

        let refused = {
            let mut table = self.contexts.write();
            match self.require_started() {
                Err(err) => Some(err),
                Ok(()) if table.by_class.contains_key(class_name) => {
                    Some(EngineError::AlreadyLoaded(class_name.to_string()))
                }
                Ok(()) => {
                    table.insert(Arc::clone(&context));
                    None
                }
            }
        };
        if let Some(err) = refused {
            debug!(application = %class_name, error = %err, "Releasing application loaded concurrently");
            if let Err(dispose_err) = context.dispose() {
                warn!(application = %class_name, error = %dispose_err, "Failed to release unused application");
            }
            return Err(err);
        }

        if let Err(err) = self
            .listeners
            .application_changed(context.info(), ApplicationEvent::Loaded)
        {
            warn!(application = %class_name, error = %err, "Application load vetoed by listener");
            self.contexts.write().remove(&context);
            if let Err(dispose_err) = context.dispose() {
                warn!(application = %class_name, error = %dispose_err, "Failed to unload vetoed application");
            }
            return Err(err);
        }

        info!(
            application = %class_name,
            name = %context.application_name(),
            "Application loaded"
        );
        Ok(context)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Arc<ApplicationContext>>, EngineError> {
        let table = self.contexts.read();
        self.require_started()?;
        Ok(table
            .by_class
            .values()
            .find(|context| context.application_name() == name)
            .cloned())
    }

    pub fn find_by_class_name(
        &self,
        class_name: &str,
    ) -> Result<Option<Arc<ApplicationContext>>, EngineError> {
        let table = self.contexts.read();
        self.require_started()?;
        Ok(table.by_class.get(class_name).cloned())
    }

    /// Unload a context. Returns `false` if it is not loaded here.
    pub fn dispose(&self, context: &ApplicationContext) -> Result<bool, EngineError> {
        self.require_started()?;
        if context.engine_id() != self.id() {
            return Err(EngineError::ForeignContext(
                context.application_class_name().to_string(),
            ));
        }

        let Some(removed) = self.contexts.write().remove(context) else {
            return Ok(false);
        };
        let result = removed.dispose();
        let _ = self
            .listeners
            .application_changed(removed.info(), ApplicationEvent::Disposed);
        info!(application = %removed.application_class_name(), "Application disposed");
        result.map(|()| true)
    }

    /// Most recently loaded context that is still loaded.
    pub fn current(&self) -> Option<Arc<ApplicationContext>> {
        self.contexts.read().current.clone()
    }

    /// Loaded contexts in load order.
    pub fn contexts(&self) -> Vec<Arc<ApplicationContext>> {
        self.contexts.read().in_load_order()
    }

    pub fn register_lifecycle_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.register(listener);
    }

    /// Returns `false` if the listener was not registered.
    pub fn deregister_lifecycle_listener(&self, listener: &Arc<dyn LifecycleListener>) -> bool {
        self.listeners.deregister(listener)
    }

    pub fn reaper(&self) -> &LeakReaper {
        self.runtime.reaper()
    }

    pub fn reclamation_stats(&self) -> QueueStats {
        self.runtime.queue().stats()
    }

    /// Promote a discovery outcome to `Available` when installed explicitly.
    pub(crate) fn mark_available(&self) {
        let _lifecycle = self.lifecycle.lock();
        if matches!(
            self.state(),
            EngineState::Undefined | EngineState::Unavailable
        ) {
            self.runtime.set_state(EngineState::Available);
        }
    }

    fn require_started(&self) -> Result<(), EngineError> {
        match self.state() {
            EngineState::Started => Ok(()),
            state => Err(EngineError::NotActive(state)),
        }
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("id", &self.id())
            .field("driver", &self.driver_name())
            .field("state", &self.state())
            .field("contexts", &self.contexts.read().order)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
