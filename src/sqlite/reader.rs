// ABOUTME: SQLite row source for the export
// ABOUTME: Reads declared column types and writes selected rows as delimited lines

use crate::source::{RowSelection, RowSource, TableDescriptor};
use crate::sqlite::converter::row_to_line;
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::io::Write;

/// Row source backed by a read-only SQLite database
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open a database file read-only (path is validated first)
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            conn: super::open_sqlite(path)?,
        })
    }

    /// Wrap an already-open connection
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn table_catalog(&self, table: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .context("Failed to prepare table_info query")?;

        let catalog = stmt
            .query_map([table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .with_context(|| format!("Failed to query columns of table '{}'", table))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to collect columns of table '{}'", table))?;

        Ok(catalog)
    }
}

impl RowSource for SqliteSource {
    async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        crate::utils::validate_identifier(table)?;
        let catalog = self.table_catalog(table)?;
        tracing::debug!("Table '{}' has {} columns", table, catalog.len());
        TableDescriptor::from_catalog(table, catalog)
    }

    async fn copy_rows(
        &self,
        selection: &RowSelection,
        delimiter: char,
        out: &mut dyn Write,
    ) -> Result<u64> {
        let sql = selection.to_sql()?;
        tracing::debug!("Streaming rows: {}", sql);

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare selection on '{}'", selection.table))?;
        let width = stmt.column_count();

        let mut rows = stmt
            .query([])
            .with_context(|| format!("Failed to query rows from '{}'", selection.table))?;

        let mut count = 0u64;
        let mut values = Vec::with_capacity(width);
        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to read row from '{}'", selection.table))?
        {
            values.clear();
            for idx in 0..width {
                values.push(row.get::<_, Value>(idx)?);
            }
            out.write_all(row_to_line(&values, delimiter).as_bytes())
                .with_context(|| format!("Failed to write rows of '{}'", selection.table))?;
            count += 1;
        }

        Ok(count)
    }

    async fn column_values(
        &self,
        selection: &RowSelection,
        column: &str,
    ) -> Result<BTreeSet<String>> {
        let sql = selection.distinct_values_sql(column)?;
        tracing::debug!("Collecting values: {}", sql);

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare value query on '{}'", selection.table))?;

        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .with_context(|| {
                format!(
                    "Failed to collect '{}' values from table '{}'",
                    column, selection.table
                )
            })?
            .collect::<Result<BTreeSet<String>, _>>()?;

        Ok(values)
    }
}
