// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports the export and plan commands

pub mod export;
pub mod plan;

pub use export::export;
pub use plan::plan;

use crate::config::{load_export_config, ExportConfig};
use anyhow::Result;

/// Config file contents, or defaults when no file was given
fn read_config(path: Option<&str>) -> Result<ExportConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            load_export_config(path)
        }
        None => Ok(ExportConfig::default()),
    }
}
