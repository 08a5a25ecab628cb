// ABOUTME: SQLite backend for the export row source
// ABOUTME: Validates database file paths and opens read-only connections

pub mod converter;
pub mod reader;

pub use reader::SqliteSource;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Validate a SQLite file path
///
/// Canonicalizes the path (which also requires it to exist), then checks that
/// it names a regular file with a `.db`, `.sqlite`, or `.sqlite3` extension.
///
/// ```no_run
/// # use seminars_export::sqlite::validate_sqlite_path;
/// assert!(validate_sqlite_path("seminars.db").is_ok());
/// assert!(validate_sqlite_path("../../../etc/passwd").is_err());
/// ```
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let canonical = PathBuf::from(path).canonicalize().with_context(|| {
        format!(
            "Failed to resolve SQLite file path '{}'. \
             File may not exist or may not be readable.",
            path
        )
    })?;

    if !canonical.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    match canonical.extension().and_then(|ext| ext.to_str()) {
        Some("db" | "sqlite" | "sqlite3") => {}
        Some(other) => bail!(
            "Invalid SQLite file extension '{}'. Must be .db, .sqlite, or .sqlite3",
            other
        ),
        None => bail!(
            "SQLite file '{}' has no extension. Must be .db, .sqlite, or .sqlite3",
            path
        ),
    }

    tracing::debug!("Validated SQLite path: {}", canonical.display());
    Ok(canonical)
}

/// Open a SQLite database read-only
///
/// The export never writes to its source, so the connection is opened with
/// `SQLITE_OPEN_READ_ONLY` and checked once before use.
pub fn open_sqlite(path: &str) -> Result<rusqlite::Connection> {
    let canonical = validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite database: {}", canonical.display());

    let conn = rusqlite::Connection::open_with_flags(
        &canonical,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .with_context(|| format!("Failed to open SQLite database: {}", canonical.display()))?;

    let _version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version (database may be corrupted)")?;

    Ok(conn)
}
