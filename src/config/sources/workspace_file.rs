//! Workspace config file source: config/engine.toml and config/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Add workspace config files to builder.
/// Precedence: config/engine.toml (base) then config/{RECLAIM_ENV}.toml.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join("config");
    let env_name = std::env::var("RECLAIM_ENV").unwrap_or_else(|_| "development".to_string());

    for path in [
        config_dir.join("engine.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ] {
        if path.exists() {
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }
    }

    Ok(builder)
}
