// ABOUTME: Converts SQLite values to COPY text fields
// ABOUTME: Matches PostgreSQL's text output so both backends produce identical dumps

use crate::source::{escape_copy_text, NULL_MARKER};
use rusqlite::types::Value;

/// Render one SQLite value the way `COPY ... TO STDOUT (FORMAT text)` would
///
/// - NULL → `\N`
/// - INTEGER, REAL → decimal text
/// - TEXT → [`escape_copy_text`]
/// - BLOB → bytea hex form, `\\x` followed by lowercase hex
///
/// ```
/// # use seminars_export::sqlite::converter::value_to_field;
/// # use rusqlite::types::Value;
/// assert_eq!(value_to_field(&Value::Null, '|'), "\\N");
/// assert_eq!(value_to_field(&Value::Integer(7), '|'), "7");
/// assert_eq!(value_to_field(&Value::Text("a\nb".into()), '|'), "a\\nb");
/// ```
pub fn value_to_field(value: &Value, delimiter: char) -> String {
    match value {
        Value::Null => NULL_MARKER.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => escape_copy_text(s, delimiter),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("\\\\x{}", hex)
        }
    }
}

/// Join rendered fields into one dump line, newline included
pub fn row_to_line(values: &[Value], delimiter: char) -> String {
    let mut line = values
        .iter()
        .map(|v| value_to_field(v, delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string());
    line.push('\n');
    line
}
