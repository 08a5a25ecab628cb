// ABOUTME: Export driver for the sanitized seminars dump
// ABOUTME: Plans all eight tables up front, then dumps and sanitizes each in order

pub mod dump;
pub mod manifest;
pub mod sanitize;
pub mod tables;

pub use dump::dump_table;
pub use manifest::{file_sha256, ExportManifest, MaskedColumn, TableManifest};
pub use sanitize::{ensure_no_stale_temp, sanitize_file, temp_path, SanitizeReport};
pub use tables::{export_tables, ApprovalRule, TableExport, SEMINARS_TABLE, SEMINAR_KEY_COLUMN};

use crate::filters::RowApproval;
use crate::masking::{default_safe_columns, Masker, MaskingPolicy, RetainedUsers};
use crate::source::{escape_copy_text, RowSelection, RowSource, TableDescriptor};
use crate::utils;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default field delimiter for dump files
pub const DEFAULT_DELIMITER: char = '|';

/// Caller-supplied settings for one export run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub retained_users: RetainedUsers,
    pub delimiter: char,
    /// Full safe-column whitelist (built-in columns plus any extras)
    pub safe_columns: BTreeSet<String>,
    pub manifest_path: Option<PathBuf>,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            retained_users: RetainedUsers::new(),
            delimiter: DEFAULT_DELIMITER,
            safe_columns: default_safe_columns(),
            manifest_path: None,
        }
    }
}

/// Everything resolved about one table before any file is written
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub export: TableExport,
    pub descriptor: TableDescriptor,
    pub selection: RowSelection,
    pub policy: MaskingPolicy,
    pub path: PathBuf,
}

/// Describe every exported table and check it can be exported safely.
///
/// Fails when a table is missing, a column has neither a safe listing nor a
/// masking rule, an approval rule reads a column the table lacks, the
/// delimiter occurs in a declared type, or a `<file>.tmp` from an earlier run
/// is still present.
pub async fn plan_export<S: RowSource>(
    source: &S,
    options: &ExportOptions,
) -> Result<Vec<TablePlan>> {
    let mut plans = Vec::new();

    for export in export_tables() {
        let descriptor = source
            .describe(export.table)
            .await
            .with_context(|| format!("Failed to describe table '{}'", export.table))?;
        let policy =
            MaskingPolicy::build(export.table, &descriptor.columns, &options.safe_columns)?;
        export.approval.validate_columns(&descriptor)?;
        descriptor.ensure_delimiter_safe(options.delimiter)?;

        let path = options.output_dir.join(export.file_name);
        ensure_no_stale_temp(&path)?;

        tracing::debug!(
            "Planned '{}': {} kept, {} masked",
            export.table,
            policy.allow_list().len(),
            policy.masked_columns().len()
        );

        plans.push(TablePlan {
            selection: export.selection(&descriptor),
            export,
            descriptor,
            policy,
            path,
        });
    }

    Ok(plans)
}

/// Export files already present in `output_dir`
pub fn existing_outputs(output_dir: &Path) -> Vec<PathBuf> {
    export_tables()
        .iter()
        .map(|export| output_dir.join(export.file_name))
        .filter(|path| path.exists())
        .collect()
}

/// Raw values rewritten into the escaped form they take in a dump file
fn dump_form<'a>(
    values: impl IntoIterator<Item = &'a String>,
    delimiter: char,
) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| escape_copy_text(value, delimiter))
        .collect()
}

/// Visible seminar keys in dump-file form, collected once from the seminars selection
async fn visible_seminars<S: RowSource>(
    source: &S,
    plans: &[TablePlan],
    delimiter: char,
) -> Result<Arc<BTreeSet<String>>> {
    let seminars = plans
        .iter()
        .find(|plan| plan.export.table == SEMINARS_TABLE)
        .context("Seminars table is not part of the export")?;

    let values = source
        .column_values(&seminars.selection, SEMINAR_KEY_COLUMN)
        .await
        .context("Failed to collect visible seminars")?;
    tracing::info!("  {} visible seminar(s)", values.len());

    Ok(Arc::new(dump_form(&values, delimiter)))
}

/// Dump and sanitize every table into `options.output_dir`.
///
/// Tables run one at a time in a fixed order. A failure stops the run; tables
/// already finished stay sanitized.
pub async fn run_export<S: RowSource>(source: &S, options: &ExportOptions) -> Result<ExportManifest> {
    utils::validate_delimiter(options.delimiter)?;

    std::fs::create_dir_all(&options.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            options.output_dir.display()
        )
    })?;

    tracing::info!("Planning export into {}", options.output_dir.display());
    let plans = plan_export(source, options).await?;
    tracing::info!("✓ Planned {} tables", plans.len());

    let mut masker = Masker::new();
    let mut manifest = ExportManifest::new(options.delimiter, options.retained_users.len());
    let mut seminars: Option<Arc<BTreeSet<String>>> = None;
    // Sanitizing compares against escaped dump fields, never raw values
    let retained = Arc::new(dump_form(&options.retained_users, options.delimiter));

    for plan in &plans {
        let rows_dumped = dump_table(
            source,
            &plan.descriptor,
            &plan.selection,
            &plan.path,
            options.delimiter,
        )
        .await?;

        let approval = match &plan.export.approval {
            ApprovalRule::All => RowApproval::All,
            ApprovalRule::None => RowApproval::None,
            ApprovalRule::RetainedUser { column } => {
                RowApproval::column_in(*column, Arc::clone(&retained))
            }
            ApprovalRule::VisibleSeminar { column } => {
                let values = match &seminars {
                    Some(values) => Arc::clone(values),
                    None => {
                        let values = visible_seminars(source, &plans, options.delimiter).await?;
                        seminars = Some(Arc::clone(&values));
                        values
                    }
                };
                RowApproval::column_in(*column, values)
            }
        };

        tracing::debug!("Approval for '{}': {}", plan.export.table, approval.describe());

        let report = sanitize_file(
            &plan.path,
            &plan.policy,
            &approval,
            &mut masker,
            &retained,
            options.delimiter,
        )
        .with_context(|| format!("Failed to sanitize {}", plan.path.display()))?;

        tracing::info!(
            "✓ Sanitized '{}': {} kept, {} dropped, {} field(s) masked",
            plan.export.table,
            report.rows_kept,
            report.rows_dropped,
            report.fields_masked
        );

        manifest.tables.push(TableManifest {
            table: plan.export.table.to_string(),
            file: plan.export.file_name.to_string(),
            rows_dumped,
            sanitize: report,
            masked_columns: plan
                .policy
                .masked_columns()
                .into_iter()
                .map(|(column, rule)| MaskedColumn {
                    column: column.to_string(),
                    rule,
                })
                .collect(),
            sha256: file_sha256(&plan.path)?,
        });
    }

    manifest.masked_identities = masker.masked_email_count();

    if let Some(path) = &options.manifest_path {
        manifest.save(path)?;
        tracing::info!("✓ Manifest written to {}", path.display());
    }

    tracing::info!(
        "✓ Export complete: {} rows kept, {} dropped across {} tables",
        manifest.total_rows_kept(),
        manifest.total_rows_dropped(),
        manifest.tables.len()
    );

    Ok(manifest)
}
