// ABOUTME: Utility functions for validation and error handling
// ABOUTME: Provides identifier validation, delimiter checks, quoting, and retry logic

use anyhow::{bail, Result};
use std::time::Duration;

/// Run `operation` until it succeeds, sleeping between failed attempts
///
/// The first attempt runs immediately; after each failure the wait starts at
/// `initial_delay` and doubles. At most `max_retries` extra attempts are made,
/// and the last error is returned if they all fail.
///
/// ```no_run
/// # use seminars_export::utils::retry_with_backoff;
/// # use std::time::Duration;
/// # async fn example() -> anyhow::Result<()> {
/// let rows = retry_with_backoff(|| async { Ok(42u64) }, 3, Duration::from_secs(1)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = max_retries + 1;
    let mut wait = initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(e.context(format!("Gave up after {} attempt(s)", attempts)));
            }
            Err(e) => {
                tracing::warn!(
                    "Attempt {}/{} failed: {:#}. Retrying in {:?}",
                    attempt,
                    attempts,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
                wait *= 2;
                attempt += 1;
            }
        }
    }
}

/// Validate a SQL identifier (table or column name)
///
/// Identifiers must:
/// - Be 1-63 characters long
/// - Start with a letter (a-z, A-Z) or underscore (_)
/// - Contain only letters, digits (0-9), or underscores
///
/// Every table and column name that ends up inside generated SQL goes through
/// this check, including names read back from the database catalog.
///
/// # Examples
///
/// ```
/// # use seminars_export::utils::validate_identifier;
/// # use anyhow::Result;
/// # fn example() -> Result<()> {
/// validate_identifier("seminars")?;
/// validate_identifier("seminar_ctr")?;
///
/// assert!(validate_identifier("123abc").is_err());
/// assert!(validate_identifier("live-link").is_err());
/// assert!(validate_identifier("id\"; DROP TABLE users; --").is_err());
/// # Ok(())
/// # }
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    if trimmed.len() > 63 {
        bail!(
            "Identifier '{}' exceeds maximum length of 63 characters (got {})",
            sanitize_identifier(trimmed),
            trimmed.len()
        );
    }

    if let Some(first_char) = trimmed.chars().next() {
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            bail!(
                "Identifier '{}' must start with a letter or underscore, not '{}'",
                sanitize_identifier(trimmed),
                first_char
            );
        }
    }

    for (i, c) in trimmed.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            bail!(
                "Identifier '{}' contains invalid character '{}' at position {}. \
                 Only letters, digits, and underscores are allowed",
                sanitize_identifier(trimmed),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to 100 chars so that error
/// messages and logs stay readable.
///
/// ```
/// # use seminars_export::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Double-quote an identifier for use in generated SQL
///
/// ```
/// # use seminars_export::utils::quote_ident;
/// assert_eq!(quote_ident("talks"), "\"talks\"");
/// assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Parse and validate the field delimiter for dump files
///
/// The delimiter must be exactly one printable ASCII character (or a tab) and
/// must not be something the PostgreSQL COPY text format reserves: backslash,
/// period, letters, digits, or line breaks. Underscore is refused because it
/// appears in column names. It is never escaped inside values,
/// so a collision surfaces later as a field-count mismatch.
pub fn parse_delimiter(input: &str) -> Result<char> {
    let mut chars = input.chars();
    let delimiter = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => bail!(
            "Delimiter must be exactly one character, got '{}'",
            input.escape_default()
        ),
    };

    validate_delimiter(delimiter)?;
    Ok(delimiter)
}

/// Check that a character can separate fields in a dump file
///
/// Must be printable ASCII (or tab) and must not occur in column names or be
/// reserved by the COPY text format.
pub fn validate_delimiter(delimiter: char) -> Result<()> {
    if !(delimiter.is_ascii_graphic() || delimiter == '\t') {
        bail!(
            "Delimiter must be a printable ASCII character or tab, got '{}'",
            delimiter.escape_default()
        );
    }
    if delimiter.is_ascii_alphanumeric() || delimiter == '\\' || delimiter == '.' {
        bail!(
            "Delimiter '{}' is reserved by the COPY text format",
            delimiter
        );
    }
    if delimiter == '_' {
        bail!("Delimiter '_' would split column names");
    }
    Ok(())
}

/// Whether a source string is a PostgreSQL connection URL
pub fn is_postgres_url(source: &str) -> bool {
    source.starts_with("postgres://") || source.starts_with("postgresql://")
}
