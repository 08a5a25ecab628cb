// ABOUTME: Writes one table's selected rows to a delimited dump file
// ABOUTME: Emits the column/type header block, then streams rows from the source

use crate::source::{RowSelection, RowSource, TableDescriptor};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header block: column names, declared types, blank line
pub fn header(descriptor: &TableDescriptor, delimiter: char) -> String {
    let sep = delimiter.to_string();
    format!(
        "{}\n{}\n\n",
        descriptor.header_columns().join(&sep),
        descriptor.header_types().join(&sep)
    )
}

/// Dump the rows `selection` picks from `source` into `path`
///
/// Creates or truncates the file. Returns the number of data lines written.
pub async fn dump_table<S: RowSource>(
    source: &S,
    descriptor: &TableDescriptor,
    selection: &RowSelection,
    path: &Path,
    delimiter: char,
) -> Result<u64> {
    tracing::info!(
        "Dumping table '{}' to {}",
        descriptor.name,
        path.display()
    );

    let file = File::create(path)
        .with_context(|| format!("Failed to create dump file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writer
        .write_all(header(descriptor, delimiter).as_bytes())
        .with_context(|| format!("Failed to write header to {}", path.display()))?;

    let rows = source
        .copy_rows(selection, delimiter, &mut writer)
        .await
        .with_context(|| format!("Failed to dump rows of table '{}'", descriptor.name))?;

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;

    tracing::info!("✓ Dumped {} rows from '{}'", rows, descriptor.name);
    Ok(rows)
}
