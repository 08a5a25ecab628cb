// ABOUTME: Row approval predicates applied during sanitization
// ABOUTME: Decides per parsed row whether it is emitted at all

use anyhow::{bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A parsed data line: column name to raw field value
pub type Row<'a> = HashMap<&'a str, &'a str>;

/// Fails unless `column` is one of the table's exported columns (`id` included)
pub fn require_column(table: &str, columns: &[String], column: &str) -> Result<()> {
    if column != "id" && !columns.iter().any(|c| c == column) {
        bail!(
            "Approval rule for table '{}' reads column '{}', which the table does not export",
            table,
            column
        );
    }
    Ok(())
}

/// Decides whether a row is written to the sanitized output
#[derive(Debug, Clone)]
pub enum RowApproval {
    /// Every row is kept
    All,
    /// Every row is dropped (only the header survives)
    None,
    /// Keep rows whose `column` value is a member of `values`
    ColumnIn {
        column: String,
        values: Arc<BTreeSet<String>>,
    },
}

impl RowApproval {
    pub fn column_in(column: impl Into<String>, values: Arc<BTreeSet<String>>) -> Self {
        RowApproval::ColumnIn {
            column: column.into(),
            values,
        }
    }

    /// Determines if a row should be kept
    pub fn approves(&self, row: &Row<'_>) -> bool {
        match self {
            RowApproval::All => true,
            RowApproval::None => false,
            RowApproval::ColumnIn { column, values } => row
                .get(column.as_str())
                .is_some_and(|value| values.contains(*value)),
        }
    }

    /// Checks that the columns this rule reads exist in the table
    pub fn validate_columns(&self, table: &str, columns: &[String]) -> Result<()> {
        match self {
            RowApproval::ColumnIn { column, .. } => require_column(table, columns, column),
            RowApproval::All | RowApproval::None => Ok(()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RowApproval::All => "all rows".to_string(),
            RowApproval::None => "no rows".to_string(),
            RowApproval::ColumnIn { column, values } => {
                format!("{} in set of {} value(s)", column, values.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(pairs: &[(&'a str, &'a str)]) -> Row<'a> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_all_and_none() {
        let r = row(&[("id", "1")]);
        assert!(RowApproval::All.approves(&r));
        assert!(!RowApproval::None.approves(&r));
    }

    #[test]
    fn test_column_in_checks_membership() {
        let visible: BTreeSet<String> = ["algebra".to_string(), "topology".to_string()].into();
        let approval = RowApproval::column_in("seminar_id", Arc::new(visible));

        assert!(approval.approves(&row(&[("id", "1"), ("seminar_id", "algebra")])));
        assert!(!approval.approves(&row(&[("id", "2"), ("seminar_id", "secret")])));
        assert!(!approval.approves(&row(&[("id", "3")])));
    }

    #[test]
    fn test_validate_columns() {
        let approval = RowApproval::column_in("email", Arc::new(BTreeSet::new()));
        assert!(approval
            .validate_columns("users", &["name".into(), "email".into()])
            .is_ok());

        let err = approval
            .validate_columns("users", &["name".into()])
            .unwrap_err();
        assert!(err.to_string().contains("'email'"));

        assert!(RowApproval::All.validate_columns("users", &[]).is_ok());
    }
}
