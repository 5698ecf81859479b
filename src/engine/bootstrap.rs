//! Process-wide default engine.
//!
//! [`engine`] resolves the default registry through discovery on first use.
//! [`set_engine`] installs an explicit instance, which takes precedence over
//! every discovery source.

use crate::config::{ConfigLoader, ReclaimConfig};
use crate::engine::discovery::{Discovery, DriverCatalog};
use crate::engine::driver::EngineDriver;
use crate::engine::registry::EngineRegistry;
use crate::error::EngineError;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

static ENGINE: Mutex<Option<Arc<EngineRegistry>>> = parking_lot::const_mutex(None);

fn catalog() -> &'static RwLock<DriverCatalog> {
    static CATALOG: OnceLock<RwLock<DriverCatalog>> = OnceLock::new();
    CATALOG.get_or_init(|| RwLock::new(DriverCatalog::with_builtins()))
}

/// Make a driver available to the configuration-file and property sources.
pub fn register_driver<F>(name: impl Into<String>, factory: F)
where
    F: Fn() -> Result<Arc<dyn EngineDriver>, EngineError> + Send + Sync + 'static,
{
    catalog().write().register(name, factory);
}

/// Register a plugin driver; the first plugin wins over configured drivers.
pub fn register_plugin<F>(name: impl Into<String>, factory: F)
where
    F: Fn() -> Result<Arc<dyn EngineDriver>, EngineError> + Send + Sync + 'static,
{
    catalog().write().register_plugin(name, factory);
}

/// The process-wide registry, resolved through discovery on first call.
pub fn engine() -> Arc<EngineRegistry> {
    let mut slot = ENGINE.lock();
    if let Some(registry) = slot.as_ref() {
        return Arc::clone(registry);
    }

    let config = load_config();
    let resolution = Discovery::standard(catalog().read().clone()).resolve();
    let registry = Arc::new(EngineRegistry::from_resolution(resolution, &config.reaper));
    info!(
        engine = %registry.id(),
        driver = registry.driver_name(),
        state = %registry.state(),
        "Default application engine resolved"
    );
    *slot = Some(Arc::clone(&registry));
    registry
}

/// Install `registry` as the process-wide engine.
///
/// The previous instance is shut down; failures are logged.
pub fn set_engine(registry: Arc<EngineRegistry>) {
    let mut slot = ENGINE.lock();
    if let Some(previous) = slot.take() {
        if !Arc::ptr_eq(&previous, &registry) {
            shut_down(&previous);
        }
    }
    registry.mark_available();
    info!(engine = %registry.id(), driver = registry.driver_name(), "Application engine installed");
    *slot = Some(registry);
}

/// Shut down and forget the process-wide engine, returning it if one existed.
pub fn reset_engine() -> Option<Arc<EngineRegistry>> {
    let previous = ENGINE.lock().take()?;
    shut_down(&previous);
    Some(previous)
}

fn shut_down(registry: &EngineRegistry) {
    if let Err(err) = registry.shutdown() {
        warn!(engine = %registry.id(), error = %err, "Failed to shut down replaced engine");
    }
}

fn load_config() -> ReclaimConfig {
    let loaded = std::env::current_dir()
        .map_err(|e| EngineError::ConfigError(e.to_string()))
        .and_then(|dir| ConfigLoader::load(&dir));
    match loaded {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Using default engine configuration");
            ReclaimConfig::default()
        }
    }
}
