// ABOUTME: Export command implementation
// ABOUTME: Opens the source, confirms overwrites, and runs the sanitized export

use crate::export::{existing_outputs, run_export, ExportManifest};
use crate::source::Source;
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::{Path, PathBuf};

/// Export the seminars database into sanitized flat files
///
/// # Arguments
///
/// * `source` - PostgreSQL URL or SQLite database file
/// * `output_dir` - Directory receiving the eight export files
/// * `retained_users` - Users kept unmasked, added to any from the config file
/// * `config_path` - Optional TOML configuration file
/// * `delimiter` - Optional delimiter override
/// * `manifest_path` - Optional path for the JSON manifest
/// * `skip_confirmation` - Overwrite existing export files without asking
pub async fn export(
    source: &str,
    output_dir: &str,
    retained_users: Vec<String>,
    config_path: Option<&str>,
    delimiter: Option<&str>,
    manifest_path: Option<&str>,
    skip_confirmation: bool,
) -> Result<ExportManifest> {
    tracing::info!("Starting sanitized export...");

    let mut options =
        super::read_config(config_path)?.into_options(output_dir, retained_users, delimiter)?;
    options.manifest_path = manifest_path.map(PathBuf::from);

    if options.retained_users.is_empty() {
        tracing::warn!("⚠ No retained users: every owner will be masked and users.txt will be empty");
    } else {
        tracing::info!("  Retaining {} user(s)", options.retained_users.len());
    }

    confirm_overwrite(&options.output_dir, skip_confirmation)?;

    tracing::info!("Opening source...");
    let source = Source::open(source)
        .await
        .context("Failed to open source database")?;
    tracing::info!("✓ Connected to {} source", source.kind());

    run_export(&source, &options).await
}

fn confirm_overwrite(output_dir: &Path, skip_confirmation: bool) -> Result<()> {
    let existing = existing_outputs(output_dir);
    if existing.is_empty() {
        return Ok(());
    }

    tracing::warn!(
        "⚠ {} export file(s) already exist in {}",
        existing.len(),
        output_dir.display()
    );
    for path in &existing {
        tracing::warn!("  {}", path.display());
    }

    if skip_confirmation {
        tracing::info!("Overwriting (--yes)");
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Overwrite existing export files?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")?;

    if !confirmed {
        tracing::warn!("⚠ User cancelled operation");
        bail!("Export cancelled by user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_needs_no_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(confirm_overwrite(dir.path(), false).is_ok());
    }

    #[test]
    fn yes_skips_the_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seminars.txt"), "old").unwrap();
        assert!(confirm_overwrite(dir.path(), true).is_ok());
    }

    #[tokio::test]
    async fn rejects_unknown_source_kind() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let result = export(
            "seminars.csv",
            out.to_str().unwrap(),
            Vec::new(),
            None,
            None,
            None,
            true,
        )
        .await;
        assert!(result.is_err());
        assert!(!out.exists());
    }
}
