//! Command routing.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_discovery_json, format_discovery_text, format_steps};
use crate::config::{ConfigLoader, ReclaimConfig};
use crate::engine::{
    engine, reset_engine, set_engine, ConfigFileSource, Discovery, DriverCatalog, EngineRegistry,
    PluginSource, PropertySource,
};
use crate::error::EngineError;
use crate::session::Resource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long `demo --leak` waits for the reaper.
const RECLAIM_TIMEOUT: Duration = Duration::from_secs(5);

/// Loaded configuration plus the inputs discovery needs.
pub struct RunContext {
    workspace: PathBuf,
    config_path: Option<PathBuf>,
    config: ReclaimConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace: PathBuf, config_path: Option<PathBuf>) -> Result<Self, EngineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace)?,
        };
        debug!(workspace = %workspace.display(), "Run context created");
        Ok(Self {
            workspace,
            config_path,
            config,
        })
    }

    pub fn config(&self) -> &ReclaimConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, EngineError> {
        match command {
            Commands::Discover {
                format,
                print_config,
            } => self.discover(format, *print_config),
            Commands::Demo { app, leak } => self.demo(app, *leak),
        }
    }

    /// An explicit `--config` file is consulted right after plugins.
    fn discovery(&self) -> Discovery {
        let mut discovery = Discovery::new(DriverCatalog::with_builtins()).with_source(PluginSource);
        if let Some(path) = &self.config_path {
            discovery = discovery.with_source(ConfigFileSource::at(path));
        } else {
            discovery = discovery.with_source(ConfigFileSource::at(
                self.workspace.join("config").join("engine.toml"),
            ));
        }
        discovery
            .with_source(ConfigFileSource::standard())
            .with_source(PropertySource::standard())
    }

    fn discover(&self, format: &str, print_config: bool) -> Result<String, EngineError> {
        let discovery = self.discovery();
        let resolution = discovery.resolve();
        let sources = discovery.source_names();
        let mut output = match format {
            "json" => format_discovery_json(&resolution, discovery.catalog(), &sources)?,
            "text" => format_discovery_text(&resolution, discovery.catalog(), &sources),
            other => {
                return Err(EngineError::ConfigError(format!(
                    "Invalid output format: {} (must be 'json' or 'text')",
                    other
                )))
            }
        };
        if print_config {
            output.push_str("\n\n");
            output.push_str(&self.config.to_toml()?);
        }
        Ok(output)
    }

    fn demo(&self, class_name: &str, leak: bool) -> Result<String, EngineError> {
        let resolution = self.discovery().resolve();
        set_engine(Arc::new(EngineRegistry::from_resolution(
            resolution,
            &self.config.reaper,
        )));
        let registry = engine();
        let result = run_demo(&registry, class_name, leak);
        reset_engine();
        result.map(|steps| format_steps(&steps))
    }
}

fn run_demo(registry: &EngineRegistry, class_name: &str, leak: bool) -> Result<Vec<String>, EngineError> {
    let mut steps = Vec::new();

    registry.start()?;
    steps.push(format!("engine {} started with driver '{}'", registry.id(), registry.driver_name()));

    let context = registry.load(class_name)?;
    steps.push(format!(
        "loaded {} as '{}'",
        context.application_class_name(),
        context.application_name()
    ));

    match registry.load(class_name) {
        Err(err) => steps.push(format!("second load rejected: {}", err)),
        Ok(_) => steps.push("second load unexpectedly succeeded".to_string()),
    }

    let mut session = context.create_session()?;
    session.modify(Resource::new("demo-1").with_attribute("name", "demo"))?;
    session.save_changes()?;
    steps.push(format!("{} saved resource demo-1", session.id()));
    if let Err(err) = context.create_session() {
        steps.push(format!("second session on this thread rejected: {}", err));
    }
    session.close()?;
    steps.push(format!("{} closed ({})", session.id(), session.state()));

    let found = context.with_session(|session| session.find("demo-1").map_err(EngineError::from))?;
    steps.push(format!("scoped session found demo-1: {}", found.is_some()));

    if leak {
        let before = registry.reaper().reclaimed();
        let leaked = context.create_session()?;
        let leaked_id = leaked.id();
        drop(leaked);
        let deadline = Instant::now() + RECLAIM_TIMEOUT;
        while registry.reaper().reclaimed() == before && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if registry.reaper().reclaimed() > before {
            steps.push(format!("{} dropped without close and reclaimed by the reaper", leaked_id));
        } else {
            steps.push(format!("{} dropped without close, not yet reclaimed", leaked_id));
        }
    }

    steps.push(format!("dispose: {}", registry.dispose(&context)?));
    steps.push(format!("dispose again: {}", registry.dispose(&context)?));

    registry.shutdown()?;
    steps.push(format!("engine {}", registry.state()));
    info!(application = %class_name, "Demo completed");
    Ok(steps)
}
