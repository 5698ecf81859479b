//! Application Engine
//!
//! Process-wide registry of loaded application contexts. The registry owns the
//! engine lifecycle state machine, hands out write sessions through contexts,
//! and wires every session into leak reclamation.

mod bootstrap;
mod context;
mod discovery;
mod driver;
mod inert;
mod listener;
pub mod memory;
mod registry;
mod runtime;
mod state;

pub use bootstrap::{engine, register_driver, register_plugin, reset_engine, set_engine};
pub use context::{ApplicationContext, ApplicationInfo};
pub use discovery::{
    ConfigFileSource, Discovery, DriverCatalog, DriverFactory, EngineSource, PluginSource,
    PropertySource, Resolution, ENGINE_DRIVER_PROPERTY,
};
pub use driver::{ApplicationBackend, EngineDriver, LoadedApplication};
pub use inert::InertDriver;
pub use listener::{ApplicationEvent, LifecycleListener};
pub use registry::EngineRegistry;
pub use runtime::EngineId;
pub use state::EngineState;
