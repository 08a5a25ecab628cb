// ABOUTME: In-place sanitization pass over a dumped table file
// ABOUTME: Drops unapproved rows, masks private columns, and swaps in the result via a .tmp file

use crate::filters::{Row, RowApproval};
use crate::masking::{ColumnAction, Masker, MaskingPolicy, RetainedUsers};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header lines copied through untouched: names, types, blank separator
const HEADER_LINES: usize = 3;

/// Row and field counts from one sanitizer pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub rows_kept: u64,
    pub rows_dropped: u64,
    pub fields_masked: u64,
}

/// Path of the scratch file used while rewriting `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Fail if a scratch file from an earlier, unfinished pass is still present
pub fn ensure_no_stale_temp(path: &Path) -> Result<()> {
    let tmp = temp_path(path);
    if tmp.exists() {
        bail!(
            "Temporary file {} already exists. A previous export may have crashed; \
             inspect it and remove it before exporting again.",
            tmp.display()
        );
    }
    Ok(())
}

fn strip_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Rewrite a dump file in place
///
/// The header's first line supplies the column list. Each data line is split on
/// `delimiter`; rows rejected by `approval` are dropped and every column the
/// policy does not keep is replaced through `masker`. Output goes to
/// `<path>.tmp`, which is renamed over `path` once every line is written.
///
/// Fields are compared as written, so `retained` and any `approval` value set
/// must already be in dump-file form ([`crate::source::escape_copy_text`]).
///
/// # Errors
///
/// - `<path>.tmp` already exists (nothing is touched)
/// - the file has no header line
/// - a header column has no action in `policy`
/// - a data line's field count differs from the header's
pub fn sanitize_file(
    path: &Path,
    policy: &MaskingPolicy,
    approval: &RowApproval,
    masker: &mut Masker,
    retained: &RetainedUsers,
    delimiter: char,
) -> Result<SanitizeReport> {
    ensure_no_stale_temp(path)?;

    let input =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(input);

    let mut header = Vec::with_capacity(HEADER_LINES);
    for _ in 0..HEADER_LINES {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .with_context(|| format!("Failed to read header of {}", path.display()))?;
        if read == 0 {
            break;
        }
        header.push(line);
    }

    let columns: Vec<String> = match header.first() {
        Some(first) => strip_line_end(first)
            .split(delimiter)
            .map(str::to_string)
            .collect(),
        None => bail!("{} is empty; expected a header line", path.display()),
    };
    let actions = policy.resolve(&columns)?;
    approval.validate_columns(policy.table(), &columns)?;

    let tmp = temp_path(path);
    let output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .with_context(|| format!("Failed to create temporary file {}", tmp.display()))?;
    let mut writer = BufWriter::new(output);

    for line in &header {
        writer.write_all(line.as_bytes())?;
    }

    let sep = delimiter.to_string();
    let mut report = SanitizeReport::default();
    let mut line = String::new();
    let mut line_no = header.len();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let fields: Vec<&str> = strip_line_end(&line).split(delimiter).collect();
        if fields.len() != columns.len() {
            bail!(
                "Line {} of {} has {} fields but the header lists {} columns \
                 (delimiter collision or column mismatch)",
                line_no,
                path.display(),
                fields.len(),
                columns.len()
            );
        }

        let row: Row<'_> = columns
            .iter()
            .map(String::as_str)
            .zip(fields.iter().copied())
            .collect();
        if !approval.approves(&row) {
            report.rows_dropped += 1;
            continue;
        }

        let rewritten: Vec<Cow<'_, str>> = fields
            .iter()
            .zip(&actions)
            .map(|(value, action)| match action {
                ColumnAction::Keep => Cow::Borrowed(*value),
                ColumnAction::Mask(rule) => {
                    report.fields_masked += 1;
                    Cow::Owned(masker.mask(*rule, value, retained))
                }
            })
            .collect();

        writer.write_all(rewritten.join(&sep).as_bytes())?;
        writer.write_all(b"\n")?;
        report.rows_kept += 1;
    }

    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .and_then(|file| file.sync_all())
        .with_context(|| format!("Failed to finish writing {}", tmp.display()))?;

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "Failed to move {} over {}",
            tmp.display(),
            path.display()
        )
    })?;

    if report.rows_dropped > 0 {
        tracing::warn!(
            "  Dropped {} unapproved row(s) from {}",
            report.rows_dropped,
            path.display()
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::{default_safe_columns, LIVE_LINK_PLACEHOLDER};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const SEMINARS: &str = "id|shortname|owner|live_link|edited_by\n\
                            bigint|text|text|text|bigint\n\
                            \n\
                            1|algebra|alice@math.edu|https://zoom.us/j/555|17\n\
                            2|topology|bob@math.edu||17\n\
                            3|geometry|alice@math.edu|https://zoom.us/j/777|4\n";

    fn policy() -> MaskingPolicy {
        MaskingPolicy::build(
            "seminars",
            &[
                "shortname".to_string(),
                "owner".to_string(),
                "live_link".to_string(),
                "edited_by".to_string(),
            ],
            &default_safe_columns(),
        )
        .unwrap()
    }

    fn write_fixture(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seminars.txt");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn data_lines(contents: &str) -> Vec<Vec<String>> {
        contents
            .lines()
            .skip(3)
            .map(|l| l.split('|').map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn masks_private_columns_and_keeps_header() {
        let (_dir, path) = write_fixture(SEMINARS);
        let mut masker = Masker::with_seed(7);

        let report = sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut masker,
            &RetainedUsers::new(),
            '|',
        )
        .unwrap();

        assert_eq!(
            report,
            SanitizeReport {
                rows_kept: 3,
                rows_dropped: 0,
                fields_masked: 9,
            }
        );

        let out = fs::read_to_string(&path).unwrap();
        assert!(out.starts_with("id|shortname|owner|live_link|edited_by\nbigint|text|text|text|bigint\n\n"));
        assert!(!out.contains("alice@math.edu"));
        assert!(!out.contains("bob@math.edu"));
        assert!(!out.contains("zoom.us/j/555"));

        let rows = data_lines(&out);
        assert_eq!(rows[0][0], "1");
        assert_eq!(rows[0][1], "algebra");
        assert_eq!(rows[0][3], LIVE_LINK_PLACEHOLDER);
        assert_eq!(rows[1][3], "");
        assert_eq!(rows[0][4], "0");
        // same owner, same mask
        assert_eq!(rows[0][2], rows[2][2]);
        assert_ne!(rows[0][2], rows[1][2]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn retained_owner_is_unchanged() {
        let (_dir, path) = write_fixture(SEMINARS);
        let retained: RetainedUsers = ["alice@math.edu".to_string()].into();

        sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut Masker::with_seed(8),
            &retained,
            '|',
        )
        .unwrap();

        let rows = data_lines(&fs::read_to_string(&path).unwrap());
        assert_eq!(rows[0][2], "alice@math.edu");
        assert_eq!(rows[2][2], "alice@math.edu");
        assert_ne!(rows[1][2], "bob@math.edu");
        assert!(rows[1][2].ends_with("@example.org"));
    }

    #[test]
    fn rejected_rows_are_dropped() {
        let (_dir, path) = write_fixture(SEMINARS);
        let keep: BTreeSet<String> = ["topology".to_string()].into();

        let report = sanitize_file(
            &path,
            &policy(),
            &RowApproval::column_in("shortname", Arc::new(keep)),
            &mut Masker::with_seed(9),
            &RetainedUsers::new(),
            '|',
        )
        .unwrap();

        assert_eq!(report.rows_kept, 1);
        assert_eq!(report.rows_dropped, 2);
        let rows = data_lines(&fs::read_to_string(&path).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "topology");
    }

    #[test]
    fn approve_none_leaves_only_the_header() {
        let (_dir, path) = write_fixture(SEMINARS);
        sanitize_file(
            &path,
            &policy(),
            &RowApproval::None,
            &mut Masker::with_seed(10),
            &RetainedUsers::new(),
            '|',
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "id|shortname|owner|live_link|edited_by\nbigint|text|text|text|bigint\n\n"
        );
    }

    #[test]
    fn stale_temp_file_aborts_without_touching_anything() {
        let (_dir, path) = write_fixture(SEMINARS);
        fs::write(temp_path(&path), "left over from a crash").unwrap();

        let err = sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut Masker::with_seed(11),
            &RetainedUsers::new(),
            '|',
        )
        .unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&path).unwrap(), SEMINARS);
        assert_eq!(
            fs::read_to_string(temp_path(&path)).unwrap(),
            "left over from a crash"
        );
    }

    #[test]
    fn field_count_mismatch_is_fatal() {
        let (_dir, path) = write_fixture(
            "id|shortname|owner|live_link|edited_by\n\
             bigint|text|text|text|bigint\n\
             \n\
             1|alg|ebra|a@b.c||1\n",
        );

        let err = sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut Masker::with_seed(12),
            &RetainedUsers::new(),
            '|',
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Line 4"));
        assert!(msg.contains("6 fields"));
    }

    #[test]
    fn unknown_header_column_is_fatal() {
        let (_dir, path) = write_fixture("id|shortname|password\ntext|text|text\n\n");
        let err = sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut Masker::with_seed(13),
            &RetainedUsers::new(),
            '|',
        )
        .unwrap_err();
        assert!(err.to_string().contains("password"));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn empty_file_is_fatal() {
        let (_dir, path) = write_fixture("");
        assert!(sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut Masker::with_seed(14),
            &RetainedUsers::new(),
            '|',
        )
        .is_err());
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let (_dir, path) = write_fixture(
            "id|shortname|owner|live_link|edited_by\r\n\
             bigint|text|text|text|bigint\r\n\
             \r\n\
             1|algebra|x@y.z||3\r\n",
        );
        let report = sanitize_file(
            &path,
            &policy(),
            &RowApproval::All,
            &mut Masker::with_seed(15),
            &RetainedUsers::new(),
            '|',
        )
        .unwrap();
        assert_eq!(report.rows_kept, 1);
        let out = fs::read_to_string(&path).unwrap();
        assert!(out.starts_with("id|shortname|owner|live_link|edited_by\r\n"));
        assert!(out.ends_with("|0\n"));
    }
}
