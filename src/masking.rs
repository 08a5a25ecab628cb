// ABOUTME: Column masking rules and the per-run value masker
// ABOUTME: Replaces private values with placeholders, memoizing masked emails within a run

use anyhow::{bail, Result};
use base64::Engine;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Placeholder meeting URL substituted for any non-empty `live_link`
pub const LIVE_LINK_PLACEHOLDER: &str = "https://mit.zoom.us/j/1234";

/// Domain used for masked email addresses
pub const MASKED_EMAIL_DOMAIN: &str = "example.org";

/// Value written in place of `edited_by`; edit history is not retained
pub const EDITED_BY_SENTINEL: &str = "0";

const MASKED_LOCAL_PART_LEN: usize = 6;
const MASKED_LOCAL_PART_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_BYTES: usize = 8;
const API_TOKEN_BYTES: usize = 32;

/// Columns considered non-sensitive across every exported table.
///
/// A table's allow-list is `id` plus the intersection of its columns with this
/// list (and any extra safe columns from configuration). Every other column must
/// have a [`MaskRule`].
pub const DEFAULT_SAFE_COLUMNS: &[&str] = &[
    "abstract",
    "access_control",
    "access_hint",
    "access_registration",
    "access_time",
    "affiliation",
    "audience",
    "chat_link",
    "city",
    "comments",
    "created",
    "deleted",
    "description",
    "display",
    "edited_at",
    "email",
    "end_date",
    "end_time",
    "frequency",
    "hidden",
    "homepage",
    "institutions",
    "is_conference",
    "language",
    "location",
    "name",
    "online",
    "paper_link",
    "per_day",
    "registration_time",
    "room",
    "seminar_ctr",
    "seminar_id",
    "shortname",
    "slides_link",
    "speaker",
    "speaker_affiliation",
    "speaker_homepage",
    "start_date",
    "start_time",
    "stream_link",
    "subjects",
    "talk_id",
    "time_slots",
    "timezone",
    "title",
    "topics",
    "type",
    "video_link",
    "visibility",
    "weekdays",
];

/// Built-in safe-column whitelist as an owned set
pub fn default_safe_columns() -> BTreeSet<String> {
    DEFAULT_SAFE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Identifiers exempt from masking in the `owner` column
pub type RetainedUsers = BTreeSet<String>;

/// How a private column is replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskRule {
    /// Non-empty values become [`LIVE_LINK_PLACEHOLDER`], empty stays empty
    LiveLink,
    /// Retained users pass through, everyone else gets a memoized fake email
    Owner,
    /// Always [`EDITED_BY_SENTINEL`]
    EditedBy,
    /// Fresh 16-character hex string
    Token,
    /// Fresh URL-safe string from 32 random bytes
    ApiToken,
}

impl MaskRule {
    /// Masking rule for a column name, if one exists
    pub fn for_column(column: &str) -> Option<Self> {
        match column {
            "live_link" => Some(MaskRule::LiveLink),
            "owner" => Some(MaskRule::Owner),
            "edited_by" => Some(MaskRule::EditedBy),
            "token" => Some(MaskRule::Token),
            "api_token" => Some(MaskRule::ApiToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskRule::LiveLink => "live_link",
            MaskRule::Owner => "owner",
            MaskRule::EditedBy => "edited_by",
            MaskRule::Token => "token",
            MaskRule::ApiToken => "api_token",
        }
    }
}

/// Produces replacement values for one export run.
///
/// Owns the email memo table, so the same real email masks to the same fake
/// email everywhere within the run. Drop it at the end of the run.
pub struct Masker {
    rng: StdRng,
    masked_emails: HashMap<String, String>,
}

impl Masker {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            masked_emails: HashMap::new(),
        }
    }

    /// Deterministic masker, for tests and reproducible fixtures
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            masked_emails: HashMap::new(),
        }
    }

    pub fn mask(&mut self, rule: MaskRule, current: &str, retained: &RetainedUsers) -> String {
        match rule {
            MaskRule::LiveLink => {
                if current.is_empty() {
                    String::new()
                } else {
                    LIVE_LINK_PLACEHOLDER.to_string()
                }
            }
            MaskRule::Owner => {
                if retained.contains(current) {
                    current.to_string()
                } else {
                    self.mask_email(current)
                }
            }
            MaskRule::EditedBy => EDITED_BY_SENTINEL.to_string(),
            MaskRule::Token => {
                let bytes = self.random_bytes(TOKEN_BYTES);
                bytes.iter().map(|b| format!("{:02x}", b)).collect()
            }
            MaskRule::ApiToken => {
                let bytes = self.random_bytes(API_TOKEN_BYTES);
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
            }
        }
    }

    /// Memoized fake email for a real identifier.
    ///
    /// Distinct inputs draw independent local parts; collisions are possible.
    pub fn mask_email(&mut self, actual: &str) -> String {
        if let Some(masked) = self.masked_emails.get(actual) {
            return masked.clone();
        }

        let local: String = (0..MASKED_LOCAL_PART_LEN)
            .map(|_| {
                let idx = self.rng.gen_range(0..MASKED_LOCAL_PART_ALPHABET.len());
                MASKED_LOCAL_PART_ALPHABET[idx] as char
            })
            .collect();
        let masked = format!("{}@{}", local, MASKED_EMAIL_DOMAIN);
        self.masked_emails.insert(actual.to_string(), masked.clone());
        masked
    }

    /// Number of distinct identifiers masked so far
    pub fn masked_email_count(&self) -> usize {
        self.masked_emails.len()
    }

    fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.rng.fill_bytes(&mut buf);
        buf
    }
}

impl Default for Masker {
    fn default() -> Self {
        Self::new()
    }
}

/// What happens to a column during sanitization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "rule")]
pub enum ColumnAction {
    Keep,
    Mask(MaskRule),
}

/// Per-table mapping from every exported column to its [`ColumnAction`].
///
/// Building the policy fails if any column is neither allow-listed nor covered
/// by a masking rule, so gaps in masking coverage surface before any file is
/// written.
#[derive(Debug, Clone)]
pub struct MaskingPolicy {
    table: String,
    actions: BTreeMap<String, ColumnAction>,
}

impl MaskingPolicy {
    /// Build the policy for `columns` (the synthetic `id` is always kept)
    pub fn build(
        table: &str,
        columns: &[String],
        safe_columns: &BTreeSet<String>,
    ) -> Result<Self> {
        let mut actions = BTreeMap::new();
        actions.insert("id".to_string(), ColumnAction::Keep);

        let mut missing = Vec::new();
        for column in columns {
            if column == "id" {
                continue;
            }
            let action = if safe_columns.contains(column) {
                ColumnAction::Keep
            } else if let Some(rule) = MaskRule::for_column(column) {
                ColumnAction::Mask(rule)
            } else {
                missing.push(column.as_str());
                continue;
            };
            actions.insert(column.clone(), action);
        }

        if !missing.is_empty() {
            bail!(
                "Need a masking rule for column(s) {} in table '{}'. \
                 Add a masking rule or list the column under safe_columns.",
                missing.join(", "),
                table
            );
        }

        Ok(Self {
            table: table.to_string(),
            actions,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn action(&self, column: &str) -> Option<ColumnAction> {
        self.actions.get(column).copied()
    }

    /// Columns passed through unchanged, `id` included
    pub fn allow_list(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|(_, action)| **action == ColumnAction::Keep)
            .map(|(column, _)| column.as_str())
            .collect()
    }

    pub fn masked_columns(&self) -> Vec<(&str, MaskRule)> {
        self.actions
            .iter()
            .filter_map(|(column, action)| match action {
                ColumnAction::Mask(rule) => Some((column.as_str(), *rule)),
                ColumnAction::Keep => None,
            })
            .collect()
    }

    /// Actions in header order; every header column must be known to the policy
    pub fn resolve(&self, header: &[String]) -> Result<Vec<ColumnAction>> {
        header
            .iter()
            .map(|column| match self.action(column) {
                Some(action) => Ok(action),
                None => bail!(
                    "Need a masking rule for column '{}' in table '{}'",
                    column,
                    self.table
                ),
            })
            .collect()
    }
}
