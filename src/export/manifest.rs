// ABOUTME: JSON audit manifest describing a completed export run
// ABOUTME: Records per-table row counts, masked columns, and SHA-256 digests of the output files

use crate::export::sanitize::SanitizeReport;
use crate::masking::MaskRule;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub table: String,
    pub file: String,
    pub rows_dumped: u64,
    #[serde(flatten)]
    pub sanitize: SanitizeReport,
    pub masked_columns: Vec<MaskedColumn>,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedColumn {
    pub column: String,
    pub rule: MaskRule,
}

/// Summary of one export run.
///
/// Retained users are counted, never listed, so the manifest can travel with
/// the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: u32,
    pub delimiter: String,
    pub retained_users: usize,
    pub masked_identities: usize,
    pub tables: Vec<TableManifest>,
}

impl ExportManifest {
    pub fn new(delimiter: char, retained_users: usize) -> Self {
        Self {
            version: MANIFEST_VERSION,
            delimiter: delimiter.to_string(),
            retained_users,
            masked_identities: 0,
            tables: Vec::new(),
        }
    }

    pub fn total_rows_kept(&self) -> u64 {
        self.tables.iter().map(|t| t.sanitize.rows_kept).sum()
    }

    pub fn total_rows_dropped(&self) -> u64 {
        self.tables.iter().map(|t| t.sanitize.rows_dropped).sum()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest at {}", path.display()))?;
        let manifest: ExportManifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest JSON at {}", path.display()))?;

        if manifest.version != MANIFEST_VERSION {
            bail!(
                "Manifest version mismatch (found {}, expected {})",
                manifest.version,
                MANIFEST_VERSION
            );
        }
        Ok(manifest)
    }

    /// Write atomically: serialize to a sibling temp file, then persist over `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create manifest directory {}", parent.display())
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp manifest in {}", parent.display()))?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), self)
            .with_context(|| format!("Failed to serialize manifest for {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("Failed to persist manifest at {}", path.display()))?;

        Ok(())
    }
}

/// Hex SHA-256 of a file's contents
pub fn file_sha256(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ExportManifest {
        let mut manifest = ExportManifest::new('|', 2);
        manifest.masked_identities = 5;
        manifest.tables.push(TableManifest {
            table: "seminars".into(),
            file: "seminars.txt".into(),
            rows_dumped: 4,
            sanitize: SanitizeReport {
                rows_kept: 3,
                rows_dropped: 1,
                fields_masked: 6,
            },
            masked_columns: vec![MaskedColumn {
                column: "owner".into(),
                rule: MaskRule::Owner,
            }],
            sha256: "abc".into(),
        });
        manifest
    }

    #[test]
    fn manifest_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let manifest = sample();
        manifest.save(&path).unwrap();

        let loaded = ExportManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.total_rows_kept(), 3);
        assert_eq!(loaded.total_rows_dropped(), 1);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"rows_kept\": 3"));
        assert!(raw.contains("\"rule\": \"owner\""));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = sample();
        manifest.version = 99;
        manifest.save(&path).unwrap();
        assert!(ExportManifest::load(&path).is_err());
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
