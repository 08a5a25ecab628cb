// ABOUTME: Row source abstraction over the seminars database
// ABOUTME: Table descriptors, declarative row selections, and backend dispatch

use crate::postgres::PostgresSource;
use crate::sqlite::SqliteSource;
use crate::utils::{self, quote_ident};
use anyhow::{bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// Text written for SQL NULL, as in the PostgreSQL COPY text format
pub const NULL_MARKER: &str = "\\N";

/// Escape a text value the way `COPY ... TO STDOUT (FORMAT text)` writes it
///
/// Backslash and the delimiter get a leading backslash; backspace, form feed,
/// newline, carriage return, tab and vertical tab become `\b`, `\f`, `\n`,
/// `\r`, `\t` and `\v`. Dump fields are compared in this form, so lookup sets
/// built from raw values must go through here first.
///
/// ```
/// # use seminars_export::source::escape_copy_text;
/// assert_eq!(escape_copy_text("alg\\geo", '|'), "alg\\\\geo");
/// assert_eq!(escape_copy_text("a|b\tc", '|'), "a\\|b\\tc");
/// ```
pub fn escape_copy_text(text: &str, delimiter: char) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\u{8}' => escaped.push_str("\\b"),
            '\u{c}' => escaped.push_str("\\f"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{b}' => escaped.push_str("\\v"),
            c if c == delimiter => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Column list and declared types for one exported table.
///
/// `columns` excludes the synthetic `id`, which every exported table must have
/// and which always leads each dumped row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub column_types: HashMap<String, String>,
}

impl TableDescriptor {
    /// Build a descriptor from catalog `(column, declared type)` pairs in table order
    pub fn from_catalog(table: &str, catalog: Vec<(String, String)>) -> Result<Self> {
        utils::validate_identifier(table)?;
        if catalog.is_empty() {
            bail!("Table '{}' does not exist or has no columns", table);
        }
        if !catalog.iter().any(|(column, _)| column == "id") {
            bail!("Table '{}' has no 'id' column", table);
        }

        let mut columns = Vec::with_capacity(catalog.len());
        let mut column_types = HashMap::with_capacity(catalog.len());
        for (column, declared) in catalog {
            utils::validate_identifier(&column)?;
            if column == "id" {
                continue;
            }
            columns.push(column.clone());
            column_types.insert(column, declared);
        }

        Ok(Self {
            name: table.to_string(),
            columns,
            column_types,
        })
    }

    /// Header column names: `id` followed by the exported columns
    pub fn header_columns(&self) -> Vec<String> {
        std::iter::once("id".to_string())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    /// Header types: `bigint` for `id` followed by each column's declared type
    pub fn header_types(&self) -> Vec<&str> {
        std::iter::once("bigint")
            .chain(
                self.columns
                    .iter()
                    .map(|c| self.column_types.get(c).map(String::as_str).unwrap_or("")),
            )
            .collect()
    }

    /// Fail if `delimiter` occurs in a declared type, which would break the header's type line
    pub fn ensure_delimiter_safe(&self, delimiter: char) -> Result<()> {
        let clashes: Vec<String> = self
            .columns
            .iter()
            .filter_map(|c| {
                let declared = self.column_types.get(c)?;
                declared
                    .contains(delimiter)
                    .then(|| format!("{} ({})", c, declared))
            })
            .collect();

        if !clashes.is_empty() {
            bail!(
                "Delimiter '{}' appears in declared type(s) of table '{}': {}. \
                 Choose another delimiter.",
                delimiter,
                self.name,
                clashes.join(", ")
            );
        }
        Ok(())
    }
}

/// Declarative description of the rows to export from one table.
///
/// `latest_by` keeps only the highest-`id` row per key before `predicate` is
/// applied, which selects the most recent version of versioned records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSelection {
    pub table: String,
    pub columns: Vec<String>,
    pub predicate: Option<String>,
    pub latest_by: Vec<String>,
}

impl RowSelection {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            predicate: None,
            latest_by: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn with_latest_by(mut self, keys: &[&str]) -> Self {
        self.latest_by = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// SELECT statement producing `id` plus the selected columns, ordered by `id`
    pub fn to_sql(&self) -> Result<String> {
        utils::validate_identifier(&self.table)?;
        for column in self.columns.iter().chain(self.latest_by.iter()) {
            utils::validate_identifier(column)?;
        }

        let table = quote_ident(&self.table);
        let id = quote_ident("id");
        let columns: Vec<String> = std::iter::once("id")
            .chain(self.columns.iter().map(String::as_str))
            .map(quote_ident)
            .collect();

        let from = if self.latest_by.is_empty() {
            table
        } else {
            let keys: Vec<String> = self.latest_by.iter().map(|k| quote_ident(k)).collect();
            format!(
                "(SELECT * FROM {table} WHERE {id} IN \
                 (SELECT MAX({id}) FROM {table} GROUP BY {keys})) AS latest",
                table = table,
                id = id,
                keys = keys.join(", ")
            )
        };

        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), from);
        if let Some(predicate) = self.predicate.as_deref() {
            if predicate.trim().is_empty() {
                bail!("Row filter for table '{}' cannot be empty", self.table);
            }
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql.push_str(&format!(" ORDER BY {}", id));
        Ok(sql)
    }

    /// Distinct non-null text values of one selected column
    pub fn distinct_values_sql(&self, column: &str) -> Result<String> {
        if column != "id" && !self.columns.iter().any(|c| c == column) {
            bail!(
                "Column '{}' is not part of the selection on table '{}'",
                column,
                self.table
            );
        }
        let quoted = quote_ident(column);
        Ok(format!(
            "SELECT DISTINCT CAST(sel.{col} AS TEXT) FROM ({inner}) AS sel WHERE sel.{col} IS NOT NULL",
            col = quoted,
            inner = self.to_sql()?
        ))
    }
}

/// The data-layer capability an export consumes
#[allow(async_fn_in_trait)]
pub trait RowSource {
    /// Column list and declared types of a table
    async fn describe(&self, table: &str) -> Result<TableDescriptor>;

    /// Stream the selected rows as delimited text lines into `out`, returning the row count
    async fn copy_rows(
        &self,
        selection: &RowSelection,
        delimiter: char,
        out: &mut dyn Write,
    ) -> Result<u64>;

    /// Distinct values of `column` among the selected rows
    async fn column_values(
        &self,
        selection: &RowSelection,
        column: &str,
    ) -> Result<BTreeSet<String>>;
}

/// Either supported database backend
pub enum Source {
    Postgres(PostgresSource),
    Sqlite(SqliteSource),
}

impl Source {
    /// Open a PostgreSQL URL or a SQLite database file
    pub async fn open(source: &str) -> Result<Self> {
        if utils::is_postgres_url(source) {
            Ok(Source::Postgres(PostgresSource::connect(source).await?))
        } else {
            Ok(Source::Sqlite(SqliteSource::open(source)?))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Source::Postgres(_) => "postgresql",
            Source::Sqlite(_) => "sqlite",
        }
    }
}

impl RowSource for Source {
    async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        match self {
            Source::Postgres(pg) => pg.describe(table).await,
            Source::Sqlite(lite) => lite.describe(table).await,
        }
    }

    async fn copy_rows(
        &self,
        selection: &RowSelection,
        delimiter: char,
        out: &mut dyn Write,
    ) -> Result<u64> {
        match self {
            Source::Postgres(pg) => pg.copy_rows(selection, delimiter, out).await,
            Source::Sqlite(lite) => lite.copy_rows(selection, delimiter, out).await,
        }
    }

    async fn column_values(
        &self,
        selection: &RowSelection,
        column: &str,
    ) -> Result<BTreeSet<String>> {
        match self {
            Source::Postgres(pg) => pg.column_values(selection, column).await,
            Source::Sqlite(lite) => lite.column_values(selection, column).await,
        }
    }
}
