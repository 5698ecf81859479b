//! Configuration System
//!
//! Layered configuration for the engine runtime: merge-policy defaults, the
//! user-level `engine.toml`, then workspace files. Deserialized with serde and
//! validated before use.

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

mod facade;
mod merge_policy;
pub(crate) mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclaimConfig {
    /// Engine selection
    #[serde(default)]
    pub engine: EngineSection,

    /// Leak reaper settings
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine selection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSection {
    /// Name of the driver to use, looked up in the driver catalog
    #[serde(default)]
    pub driver: Option<String>,
}

/// Leak reaper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Thread name prefix; the worker generation is appended
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Spawn a replacement worker after an unexpected wait failure
    #[serde(default = "default_true")]
    pub restart_on_failure: bool,
}

fn default_thread_name() -> String {
    "leak-reaper".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            restart_on_failure: default_true(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Engine(String),
    Reaper(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "Engine: {}", msg),
            ValidationError::Reaper(msg) => write!(f, "Reaper: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ReclaimConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(driver) = &self.engine.driver {
            if driver.trim().is_empty() {
                errors.push(ValidationError::Engine(
                    "driver name cannot be empty".to_string(),
                ));
            }
        }

        let thread_name = self.reaper.thread_name.trim();
        if thread_name.is_empty() {
            errors.push(ValidationError::Reaper(
                "thread_name cannot be empty".to_string(),
            ));
        } else if thread_name.contains('\0') {
            errors.push(ValidationError::Reaper(
                "thread_name cannot contain NUL bytes".to_string(),
            ));
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all errors into a single [`EngineError`].
    pub fn ensure_valid(&self) -> Result<(), EngineError> {
        self.validate().map_err(|errors| {
            EngineError::ConfigError(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })
    }

    /// Render as TOML, e.g. for `reclaim discover --print-config`.
    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::ConfigError(e.to_string()))
    }
}
