// ABOUTME: The fixed set of exported tables and their row policies
// ABOUTME: Query filters, latest-version keys, and approval rules per table

use crate::filters;
use crate::source::{RowSelection, TableDescriptor};
use anyhow::Result;

pub const SEMINARS_TABLE: &str = "seminars";

/// Column of `seminars` that talks refer to
pub const SEMINAR_KEY_COLUMN: &str = "shortname";

/// Which rows of a dumped table survive sanitization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalRule {
    All,
    None,
    /// `column` must name a seminar selected by the seminars export
    VisibleSeminar { column: &'static str },
    /// `column` must hold a retained user identifier
    RetainedUser { column: &'static str },
}

impl ApprovalRule {
    pub fn column(&self) -> Option<&'static str> {
        match self {
            ApprovalRule::VisibleSeminar { column } | ApprovalRule::RetainedUser { column } => {
                Some(column)
            }
            ApprovalRule::All | ApprovalRule::None => None,
        }
    }

    pub fn validate_columns(&self, descriptor: &TableDescriptor) -> Result<()> {
        match self.column() {
            Some(column) => filters::require_column(&descriptor.name, &descriptor.columns, column),
            None => Ok(()),
        }
    }
}

/// One entry of the export: source table, output file, and row policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExport {
    pub file_name: &'static str,
    pub table: &'static str,
    pub predicate: Option<&'static str>,
    pub latest_by: &'static [&'static str],
    pub approval: ApprovalRule,
}

impl TableExport {
    const fn plain(file_name: &'static str, table: &'static str, approval: ApprovalRule) -> Self {
        Self {
            file_name,
            table,
            predicate: None,
            latest_by: &[],
            approval,
        }
    }

    /// Row selection over every exported column of the table
    pub fn selection(&self, descriptor: &TableDescriptor) -> RowSelection {
        let mut selection = RowSelection::new(self.table, descriptor.columns.clone())
            .with_latest_by(self.latest_by);
        if let Some(predicate) = self.predicate {
            selection = selection.with_predicate(predicate);
        }
        selection
    }
}

/// The eight exports, in the order they run.
///
/// Seminars and talks keep only their most recent version, so information an
/// organizer removed in a later edit is never exported.
pub fn export_tables() -> Vec<TableExport> {
    vec![
        TableExport {
            file_name: "seminars.txt",
            table: SEMINARS_TABLE,
            predicate: Some("visibility = 2 AND deleted = false"),
            latest_by: &[SEMINAR_KEY_COLUMN],
            approval: ApprovalRule::All,
        },
        TableExport {
            file_name: "talks.txt",
            table: "talks",
            predicate: Some("hidden = false AND deleted = false"),
            latest_by: &["seminar_id", "seminar_ctr"],
            approval: ApprovalRule::VisibleSeminar {
                column: "seminar_id",
            },
        },
        TableExport::plain(
            "users.txt",
            "users",
            ApprovalRule::RetainedUser { column: "email" },
        ),
        TableExport::plain("institutions.txt", "institutions", ApprovalRule::All),
        TableExport::plain("new_topics.txt", "new_topics", ApprovalRule::All),
        TableExport::plain(
            "preendorsed_users.txt",
            "preendorsed_users",
            ApprovalRule::None,
        ),
        TableExport::plain(
            "seminar_organizers.txt",
            "seminar_organizers",
            ApprovalRule::All,
        ),
        TableExport::plain(
            "talk_registrations.txt",
            "talk_registrations",
            ApprovalRule::None,
        ),
    ]
}
