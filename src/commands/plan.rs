// ABOUTME: Plan command implementation
// ABOUTME: Shows which columns each table keeps or masks without writing files

use crate::export::{plan_export, ApprovalRule, MaskedColumn, TablePlan};
use crate::source::Source;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub file: String,
    pub kept: Vec<String>,
    pub masked: Vec<MaskedColumn>,
    pub approval: String,
}

impl TableSummary {
    fn from_plan(plan: &TablePlan) -> Self {
        Self {
            table: plan.export.table.to_string(),
            file: plan.export.file_name.to_string(),
            kept: plan
                .policy
                .allow_list()
                .into_iter()
                .map(str::to_string)
                .collect(),
            masked: plan
                .policy
                .masked_columns()
                .into_iter()
                .map(|(column, rule)| MaskedColumn {
                    column: column.to_string(),
                    rule,
                })
                .collect(),
            approval: describe_approval(&plan.export.approval),
        }
    }
}

fn describe_approval(rule: &ApprovalRule) -> String {
    match rule {
        ApprovalRule::All => "all rows".to_string(),
        ApprovalRule::None => "no rows".to_string(),
        ApprovalRule::VisibleSeminar { column } => format!("{} in visible seminars", column),
        ApprovalRule::RetainedUser { column } => format!("{} in retained users", column),
    }
}

/// Print every table's kept and masked columns
///
/// Nothing is written; the planning checks still run against `output_dir` and
/// the configured delimiter, so a missing masking rule or a stale temp file
/// fails here exactly as it would during an export.
pub async fn plan(
    source: &str,
    output_dir: &str,
    config_path: Option<&str>,
    json: bool,
) -> Result<()> {
    let options = super::read_config(config_path)?.into_options(output_dir, Vec::new(), None)?;

    let source = Source::open(source)
        .await
        .context("Failed to open source database")?;
    tracing::info!("✓ Connected to {} source", source.kind());

    let plans = plan_export(&source, &options).await?;
    let summaries: Vec<TableSummary> = plans.iter().map(TableSummary::from_plan).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Failed to serialize plan")?
        );
    } else {
        print!("{}", render(&summaries));
    }
    Ok(())
}

fn render(summaries: &[TableSummary]) -> String {
    let mut out = String::new();
    for summary in summaries {
        out.push_str(&format!("{} -> {}\n", summary.table, summary.file));
        out.push_str(&format!("  rows:   {}\n", summary.approval));
        out.push_str(&format!("  kept:   {}\n", summary.kept.join(", ")));
        let masked: Vec<String> = summary
            .masked
            .iter()
            .map(|m| format!("{} ({})", m.column, m.rule.as_str()))
            .collect();
        out.push_str(&format!(
            "  masked: {}\n",
            if masked.is_empty() {
                "-".to_string()
            } else {
                masked.join(", ")
            }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::MaskRule;

    #[test]
    fn render_lists_kept_and_masked_columns() {
        let summaries = vec![TableSummary {
            table: "users".into(),
            file: "users.txt".into(),
            kept: vec!["email".into(), "id".into()],
            masked: vec![MaskedColumn {
                column: "api_token".into(),
                rule: MaskRule::ApiToken,
            }],
            approval: describe_approval(&ApprovalRule::RetainedUser { column: "email" }),
        }];

        assert_eq!(
            render(&summaries),
            "users -> users.txt\n  rows:   email in retained users\n  kept:   email, id\n  masked: api_token (api_token)\n"
        );
    }

    #[test]
    fn render_marks_tables_without_masking() {
        let summaries = vec![TableSummary {
            table: "institutions".into(),
            file: "institutions.txt".into(),
            kept: vec!["id".into(), "name".into()],
            masked: Vec::new(),
            approval: describe_approval(&ApprovalRule::All),
        }];
        assert!(render(&summaries).ends_with("  masked: -\n"));
    }
}
