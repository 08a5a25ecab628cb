// ABOUTME: PostgreSQL row source for the export
// ABOUTME: Reads column catalogs and streams selections out with COPY TO STDOUT

use crate::source::{RowSelection, RowSource, TableDescriptor};
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use futures::{pin_mut, StreamExt};
use std::collections::BTreeSet;
use std::io::Write;
use tokio_postgres::Client;

/// Row source backed by a live PostgreSQL connection
pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = super::connect_with_retry(url)
            .await
            .context("Failed to connect to source database")?;
        Ok(Self { client })
    }
}

/// COPY statement for a selection, using the dump delimiter
pub fn copy_out_sql(selection: &RowSelection, delimiter: char) -> Result<String> {
    let delimiter_literal = delimiter.to_string().replace('\'', "''");
    Ok(format!(
        "COPY ({}) TO STDOUT WITH (FORMAT text, DELIMITER '{}')",
        selection.to_sql()?,
        delimiter_literal
    ))
}

impl RowSource for PostgresSource {
    async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        crate::utils::validate_identifier(table)?;

        let rows = self
            .client
            .query(
                "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
                 FROM pg_catalog.pg_attribute a \
                 WHERE a.attrelid = $1::text::regclass \
                   AND a.attnum > 0 \
                   AND NOT a.attisdropped \
                 ORDER BY a.attnum",
                &[&quote_ident(table)],
            )
            .await
            .with_context(|| format!("Failed to read column catalog for table '{}'", table))?;

        let catalog = rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect();

        TableDescriptor::from_catalog(table, catalog)
    }

    async fn copy_rows(
        &self,
        selection: &RowSelection,
        delimiter: char,
        out: &mut dyn Write,
    ) -> Result<u64> {
        let sql = copy_out_sql(selection, delimiter)?;
        tracing::debug!("Streaming rows: {}", sql);

        let reader = self
            .client
            .copy_out(&sql)
            .await
            .with_context(|| format!("Failed to copy data from table '{}'", selection.table))?;
        pin_mut!(reader);

        let mut rows = 0u64;
        while let Some(chunk) = reader.next().await {
            let data = chunk
                .with_context(|| format!("COPY stream from '{}' failed", selection.table))?;
            rows += data.iter().filter(|b| **b == b'\n').count() as u64;
            out.write_all(&data)
                .with_context(|| format!("Failed to write rows of '{}'", selection.table))?;
        }

        Ok(rows)
    }

    async fn column_values(
        &self,
        selection: &RowSelection,
        column: &str,
    ) -> Result<BTreeSet<String>> {
        let sql = selection.distinct_values_sql(column)?;
        tracing::debug!("Collecting values: {}", sql);

        let rows = self.client.query(&sql, &[]).await.with_context(|| {
            format!(
                "Failed to collect '{}' values from table '{}'",
                column, selection.table
            )
        })?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_out_sql_uses_delimiter() {
        let sel = RowSelection::new("institutions", vec!["name".into()]);
        assert_eq!(
            copy_out_sql(&sel, '|').unwrap(),
            "COPY (SELECT \"id\", \"name\" FROM \"institutions\" ORDER BY \"id\") \
             TO STDOUT WITH (FORMAT text, DELIMITER '|')"
        );
    }

    #[test]
    fn test_copy_out_sql_escapes_quote_delimiter() {
        let sel = RowSelection::new("institutions", vec![]);
        assert!(copy_out_sql(&sel, '\'')
            .unwrap()
            .ends_with("DELIMITER '''')"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_describe_seminars_table() {
        let url = std::env::var("TEST_SOURCE_URL").unwrap();
        let source = PostgresSource::connect(&url).await.unwrap();
        let desc = source.describe("seminars").await.unwrap();
        assert!(desc.columns.contains(&"shortname".to_string()));
        assert!(!desc.columns.contains(&"id".to_string()));
    }
}
