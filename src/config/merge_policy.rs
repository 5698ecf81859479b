//! Merge rules: defaults applied before any file source.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("reaper.thread_name", "leak-reaper")?
        .set_default("reaper.restart_on_failure", true)?
        .set_default("logging.level", "info")
}
