//! Engine discovery
//!
//! Resolves which driver backs the default registry. Sources are consulted in
//! order and the first one that names a driver wins:
//!
//! 1. plugins registered in the driver catalog
//! 2. `engine.driver` in the user-level `engine.toml`
//! 3. the `RECLAIM_ENGINE_DRIVER` environment variable
//!
//! A source that names a driver which cannot be built is recorded as a
//! failure and the search continues. If nothing resolves, an [`InertDriver`]
//! is installed in state `Undefined` (nothing configured) or `Unavailable`
//! (something configured but broken).

use crate::config::{global_config_path, ConfigLoader};
use crate::engine::driver::EngineDriver;
use crate::engine::inert::InertDriver;
use crate::engine::memory::MemoryDriver;
use crate::engine::state::EngineState;
use crate::error::EngineError;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable naming the engine driver.
pub const ENGINE_DRIVER_PROPERTY: &str = "RECLAIM_ENGINE_DRIVER";

/// Builds a driver on demand.
pub type DriverFactory = Arc<dyn Fn() -> Result<Arc<dyn EngineDriver>, EngineError> + Send + Sync>;

/// Named driver factories plus the subset registered as plugins.
#[derive(Clone, Default)]
pub struct DriverCatalog {
    factories: HashMap<String, DriverFactory>,
    plugins: Vec<String>,
}

impl DriverCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the drivers shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(MemoryDriver::NAME, || {
            Ok(Arc::new(MemoryDriver::new()) as Arc<dyn EngineDriver>)
        });
        catalog
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn EngineDriver>, EngineError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a driver and mark it as a plugin. The first plugin
    /// registered takes precedence over configured drivers.
    pub fn register_plugin<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn EngineDriver>, EngineError> + Send + Sync + 'static,
    {
        let name = name.into();
        if !self.plugins.contains(&name) {
            self.plugins.push(name.clone());
        }
        self.register(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn build(&self, name: &str) -> Result<Arc<dyn EngineDriver>, EngineError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            EngineError::Discovery(format!(
                "unknown engine driver '{}' (known: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        factory()
    }
}

impl fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("drivers", &self.names())
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// One place discovery looks for a driver.
pub trait EngineSource: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when this source names no driver.
    fn resolve(&self, catalog: &DriverCatalog) -> Result<Option<Arc<dyn EngineDriver>>, EngineError>;
}

/// First plugin registered in the catalog.
#[derive(Debug, Default)]
pub struct PluginSource;

impl EngineSource for PluginSource {
    fn name(&self) -> &str {
        "plugin"
    }

    fn resolve(&self, catalog: &DriverCatalog) -> Result<Option<Arc<dyn EngineDriver>>, EngineError> {
        match catalog.plugins().first() {
            Some(name) => catalog.build(name).map(Some),
            None => Ok(None),
        }
    }
}

/// `engine.driver` from a TOML configuration file.
#[derive(Debug)]
pub struct ConfigFileSource {
    path: Option<PathBuf>,
}

impl ConfigFileSource {
    /// The user-level `engine.toml`.
    pub fn standard() -> Self {
        Self {
            path: global_config_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl EngineSource for ConfigFileSource {
    fn name(&self) -> &str {
        "config-file"
    }

    fn resolve(&self, catalog: &DriverCatalog) -> Result<Option<Arc<dyn EngineDriver>>, EngineError> {
        let Some(path) = self.path.as_deref().filter(|path| path.exists()) else {
            return Ok(None);
        };
        let config = ConfigLoader::load_from_file(path)?;
        match config.engine.driver {
            Some(driver) => {
                debug!(config_path = %path.display(), driver = %driver, "Engine driver configured in file");
                catalog.build(driver.trim()).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Driver name from an environment variable.
#[derive(Debug)]
pub struct PropertySource {
    variable: String,
}

impl PropertySource {
    /// Reads [`ENGINE_DRIVER_PROPERTY`].
    pub fn standard() -> Self {
        Self::named(ENGINE_DRIVER_PROPERTY)
    }

    pub fn named(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl EngineSource for PropertySource {
    fn name(&self) -> &str {
        &self.variable
    }

    fn resolve(&self, catalog: &DriverCatalog) -> Result<Option<Arc<dyn EngineDriver>>, EngineError> {
        match std::env::var(&self.variable) {
            Ok(value) if !value.trim().is_empty() => catalog.build(value.trim()).map(Some),
            _ => Ok(None),
        }
    }
}

/// Outcome of a discovery run.
pub struct Resolution {
    pub driver: Arc<dyn EngineDriver>,
    /// Source that supplied the driver; `None` when the inert driver was installed
    pub source: Option<String>,
    pub state: EngineState,
    /// Failures from sources that named an unusable driver
    pub failures: Vec<String>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("driver", &self.driver.name())
            .field("source", &self.source)
            .field("state", &self.state)
            .field("failures", &self.failures)
            .finish()
    }
}

/// Ordered list of sources over a catalog.
pub struct Discovery {
    catalog: DriverCatalog,
    sources: Vec<Box<dyn EngineSource>>,
}

impl Discovery {
    /// Discovery with no sources; add them with [`with_source`](Self::with_source).
    pub fn new(catalog: DriverCatalog) -> Self {
        Self {
            catalog,
            sources: Vec::new(),
        }
    }

    /// Plugins, then the user-level config file, then the environment.
    pub fn standard(catalog: DriverCatalog) -> Self {
        Self::new(catalog)
            .with_source(PluginSource)
            .with_source(ConfigFileSource::standard())
            .with_source(PropertySource::standard())
    }

    pub fn with_source(mut self, source: impl EngineSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn catalog(&self) -> &DriverCatalog {
        &self.catalog
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn resolve(&self) -> Resolution {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.resolve(&self.catalog) {
                Ok(Some(driver)) => {
                    info!(source = source.name(), driver = driver.name(), "Engine driver resolved");
                    return Resolution {
                        driver,
                        source: Some(source.name().to_string()),
                        state: EngineState::Available,
                        failures,
                    };
                }
                Ok(None) => debug!(source = source.name(), "No engine driver named"),
                Err(err) => {
                    warn!(source = source.name(), error = %err, "Engine source failed");
                    failures.push(format!("{}: {}", source.name(), err));
                }
            }
        }

        let (state, reason) = if failures.is_empty() {
            (EngineState::Undefined, "no engine driver configured".to_string())
        } else {
            (EngineState::Unavailable, failures.join("; "))
        };
        error!(state = %state, reason = %reason, "No usable application engine found");
        Resolution {
            driver: Arc::new(InertDriver::new(reason)),
            source: None,
            state,
            failures,
        }
    }
}
