//! Logging System
//!
//! Structured logging using the `tracing` crate. Level, format and destination
//! come from [`LoggingConfig`], with environment variables taking precedence:
//! `RECLAIM_LOG` (filter directives), `RECLAIM_LOG_FORMAT`,
//! `RECLAIM_LOG_OUTPUT` and `RECLAIM_LOG_MODULES` (`module=level,...`).

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path, used when output is "file"
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format on a terminal stream only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        LogFormat::parse(&self.format)?;
        LogOutput::parse(&self.output)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogOutput {
    Stdout,
    Stderr,
    File,
}

impl LogOutput {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            other => Err(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
                other
            )),
        }
    }
}

/// Default log file: `<state dir>/reclaim.log`, falling back to the working directory.
pub fn default_log_file() -> PathBuf {
    directories::ProjectDirs::from("", "", "reclaim")
        .map(|dirs| {
            dirs.state_dir()
                .unwrap_or_else(|| dirs.data_local_dir())
                .join("reclaim.log")
        })
        .unwrap_or_else(|| PathBuf::from("reclaim.log"))
}

/// Initialize the global subscriber.
///
/// Returns an error if the configuration is invalid or a global subscriber
/// is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), EngineError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let writer = match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File => BoxMakeWriter::new(open_log_file(config)?),
    };
    let ansi = config.color && output != LogOutput::File;

    let base = Registry::default().with(filter);
    let result = match format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };

    result.map_err(|e| EngineError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn open_log_file(config: &LoggingConfig) -> Result<std::sync::Mutex<std::fs::File>, EngineError> {
    let log_file = config.file.clone().unwrap_or_else(default_log_file);
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            EngineError::ConfigError(format!("Failed to create log directory: {}", e))
        })?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|e| {
            EngineError::ConfigError(format!("Failed to open log file {:?}: {}", log_file, e))
        })?;
    Ok(std::sync::Mutex::new(file))
}

/// Build the filter from `RECLAIM_LOG`, else from config plus module overrides.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, EngineError> {
    if let Ok(filter) = EnvFilter::try_from_env("RECLAIM_LOG") {
        return Ok(filter);
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);

    let env_modules = std::env::var("RECLAIM_LOG_MODULES").unwrap_or_default();
    let env_directives = env_modules
        .split(',')
        .filter_map(|spec| spec.split_once('='))
        .map(|(module, level)| (module.trim().to_string(), level.trim().to_string()));

    for (module, level) in config
        .modules
        .iter()
        .map(|(m, l)| (m.clone(), l.clone()))
        .chain(env_directives)
    {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| EngineError::ConfigError(format!("Invalid log directive: {}", e)))?,
        );
    }

    Ok(filter)
}

fn determine_format(config: &LoggingConfig) -> Result<LogFormat, EngineError> {
    if let Ok(format) = std::env::var("RECLAIM_LOG_FORMAT") {
        if let Ok(format) = LogFormat::parse(&format) {
            return Ok(format);
        }
    }
    LogFormat::parse(&config.format).map_err(EngineError::ConfigError)
}

fn determine_output(config: &LoggingConfig) -> Result<LogOutput, EngineError> {
    match std::env::var("RECLAIM_LOG_OUTPUT") {
        Ok(output) => LogOutput::parse(&output),
        Err(_) => LogOutput::parse(&config.output),
    }
    .map_err(EngineError::ConfigError)
}
