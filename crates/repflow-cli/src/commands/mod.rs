pub mod config;
pub mod play;
pub mod rest;
pub mod schedule;

use std::path::Path;

use repflow_core::Schedule;

/// Read a schedule document. `.toml` files are parsed as TOML, anything
/// else as JSON.
pub fn read_schedule_file(path: &Path) -> Result<Schedule, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let schedule = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    Ok(schedule)
}
