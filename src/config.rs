// ABOUTME: Parses the optional export configuration file
// ABOUTME: Supplies retained users, extra safe columns, and the delimiter from TOML

use crate::export::{ExportOptions, DEFAULT_DELIMITER};
use crate::masking::default_safe_columns;
use crate::utils;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Users whose identity survives masking
    #[serde(default)]
    pub retained_users: Vec<String>,
    /// Columns exported unmasked, on top of the built-in whitelist
    #[serde(default)]
    pub safe_columns: Vec<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
}

impl ExportConfig {
    /// Combine the file settings with command-line overrides.
    ///
    /// Command-line retained users add to the file's list; a command-line
    /// delimiter replaces the file's.
    pub fn into_options(
        self,
        output_dir: impl Into<PathBuf>,
        extra_retained: Vec<String>,
        delimiter: Option<&str>,
    ) -> Result<ExportOptions> {
        let delimiter = match delimiter.or(self.delimiter.as_deref()) {
            Some(raw) => utils::parse_delimiter(raw)?,
            None => DEFAULT_DELIMITER,
        };

        let mut safe_columns = default_safe_columns();
        for column in self.safe_columns {
            utils::validate_identifier(&column)
                .with_context(|| format!("Invalid safe column '{}'", column))?;
            safe_columns.insert(column);
        }

        let mut options = ExportOptions::new(output_dir);
        options.delimiter = delimiter;
        options.safe_columns = safe_columns;
        options.retained_users = self
            .retained_users
            .into_iter()
            .chain(extra_retained)
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .collect();
        Ok(options)
    }
}

pub fn load_export_config(path: &str) -> Result<ExportConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path))?;
    let parsed: ExportConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse TOML config at {}", path))?;
    Ok(parsed)
}
