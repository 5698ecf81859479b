//! Shared test utilities for integration tests
//!
//! Discovery reads `XDG_CONFIG_HOME`, `HOME` and `RECLAIM_ENGINE_DRIVER`, and
//! the default engine is process-global. Tests touching either go through
//! [`with_engine_env`], which serializes them and restores the environment.

use reclaim::engine::memory::MemoryDriver;
use reclaim::engine::{
    reset_engine, ApplicationBackend, EngineDriver, EngineRegistry, LoadedApplication,
    ENGINE_DRIVER_PROPERTY,
};
use reclaim::error::EngineError;
use reclaim::session::NativeSession;
use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Global mutex to serialize environment and singleton access across tests
static ENGINE_ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARIABLES: [&str; 3] = ["HOME", "XDG_CONFIG_HOME", ENGINE_DRIVER_PROPERTY];

/// Environment variable state to restore after test
struct EnvState {
    values: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            values: VARIABLES
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.values {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Isolated discovery environment rooted in a temp dir.
pub struct EngineEnv {
    config_home: PathBuf,
}

impl EngineEnv {
    /// Write `$XDG_CONFIG_HOME/reclaim/engine.toml`.
    pub fn write_global_config(&self, contents: &str) -> PathBuf {
        let dir = self.config_home.join("reclaim");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn set_driver_property(&self, driver: &str) {
        std::env::set_var(ENGINE_DRIVER_PROPERTY, driver);
    }
}

/// Run `f` with isolated XDG directories, no driver property and no cached
/// default engine. Everything is restored afterwards.
pub fn with_engine_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce(&EngineEnv) -> R,
{
    let _guard = ENGINE_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let config_home = test_dir.path().join("config");
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&config_home).unwrap();
    std::fs::create_dir_all(&home).unwrap();

    std::env::set_var("HOME", home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", config_home.to_str().unwrap());
    std::env::remove_var(ENGINE_DRIVER_PROPERTY);
    reset_engine();

    let result = f(&EngineEnv { config_home });

    reset_engine();
    env_state.restore();
    result
}

/// A started registry over a fresh in-memory driver.
pub fn started_registry() -> (Arc<MemoryDriver>, EngineRegistry) {
    let driver = Arc::new(MemoryDriver::new());
    let registry = EngineRegistry::new(Arc::clone(&driver) as Arc<dyn EngineDriver>);
    registry.start().unwrap();
    (driver, registry)
}

/// Poll `condition` for up to five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// In-memory driver whose backends stop inside `open_session` until the
/// test meets them at the gate twice: once on entry, once to proceed.
pub struct GatedDriver {
    inner: MemoryDriver,
    gate: Arc<Barrier>,
}

impl GatedDriver {
    pub fn new(gate: Arc<Barrier>) -> Self {
        Self {
            inner: MemoryDriver::new(),
            gate,
        }
    }

    pub fn memory(&self) -> &MemoryDriver {
        &self.inner
    }
}

impl EngineDriver for GatedDriver {
    fn name(&self) -> &str {
        "gated"
    }

    fn load_application(&self, class_name: &str) -> Result<LoadedApplication, EngineError> {
        let loaded = self.inner.load_application(class_name)?;
        Ok(LoadedApplication {
            name: loaded.name,
            backend: Arc::new(GatedBackend {
                inner: loaded.backend,
                gate: Arc::clone(&self.gate),
            }),
        })
    }
}

struct GatedBackend {
    inner: Arc<dyn ApplicationBackend>,
    gate: Arc<Barrier>,
}

impl ApplicationBackend for GatedBackend {
    fn open_session(&self) -> Result<Box<dyn NativeSession>, EngineError> {
        self.gate.wait();
        self.gate.wait();
        self.inner.open_session()
    }
}
