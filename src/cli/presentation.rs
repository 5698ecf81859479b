//! Text and JSON rendering of command results.

use crate::engine::{DriverCatalog, Resolution};
use crate::error::EngineError;
use serde_json::json;

pub fn map_error(e: &EngineError) -> String {
    e.to_string()
}

pub fn format_discovery_text(resolution: &Resolution, catalog: &DriverCatalog, sources: &[String]) -> String {
    let mut lines = vec![
        format!("Driver:  {}", resolution.driver.name()),
        format!("Source:  {}", resolution.source.as_deref().unwrap_or("(none)")),
        format!("State:   {}", resolution.state),
        format!("Known:   {}", catalog.names().join(", ")),
        format!("Order:   {}", sources.join(" -> ")),
    ];
    if !resolution.failures.is_empty() {
        lines.push("Failures:".to_string());
        lines.extend(resolution.failures.iter().map(|f| format!("  - {}", f)));
    }
    lines.join("\n")
}

pub fn format_discovery_json(
    resolution: &Resolution,
    catalog: &DriverCatalog,
    sources: &[String],
) -> Result<String, EngineError> {
    let value = json!({
        "driver": resolution.driver.name(),
        "source": resolution.source,
        "state": resolution.state,
        "known_drivers": catalog.names(),
        "sources": sources,
        "failures": resolution.failures,
    });
    serde_json::to_string_pretty(&value)
        .map_err(|e| EngineError::ConfigError(format!("Failed to render JSON: {}", e)))
}

/// Numbered step list.
pub fn format_steps(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{:>2}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}
