//! Records Module
//!
//! Lists and the records they hold.
//!
//! ## Line Format
//! ```text
//!   primary              → Record { primary, secondary: None }
//!   primary|secondary    → Record { primary, secondary: Some(..) }
//! ```
//! A line is split on the first `|`, so `primary` never contains one while
//! `secondary` may. Blank lines are skipped, surrounding whitespace (and a
//! trailing `\r`) is trimmed, and an empty secondary is stored as absent.

mod proxy;
mod store;

pub use proxy::{validate_proxy, ProxyAddr};
pub use store::{ListMeta, RecordStore};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Separator between primary and secondary fields
pub const FIELD_SEPARATOR: char = '|';

// =============================================================================
// Identity
// =============================================================================

/// Immutable opaque list identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(String);

impl ListId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a list holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    #[default]
    Accounts,
    Proxies,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Accounts => "accounts",
            ListKind::Proxies => "proxies",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accounts" => Ok(ListKind::Accounts),
            "proxies" => Ok(ListKind::Proxies),
            other => Err(VaultError::Invalid(format!("unknown list kind: {:?}", other))),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// One imported line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub primary: String,
    pub secondary: Option<String>,
}

impl Record {
    pub fn new(primary: impl Into<String>, secondary: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary,
        }
    }

    /// Parse one line of an import file (`line_no` is 1-based)
    ///
    /// Returns `Ok(None)` for a blank line.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (primary, secondary) = match line.split_once(FIELD_SEPARATOR) {
            Some((p, s)) => (p.trim(), Some(s.trim())),
            None => (line, None),
        };

        if primary.is_empty() {
            return Err(VaultError::Invalid(format!(
                "line {}: empty primary field",
                line_no
            )));
        }

        Ok(Some(Self {
            primary: primary.to_string(),
            secondary: secondary.filter(|s| !s.is_empty()).map(str::to_string),
        }))
    }

    /// Parse one entry of an API request (`position` is 1-based)
    ///
    /// Unlike a file line, a blank entry is rejected.
    pub fn parse_entry(entry: &str, position: usize) -> Result<Self> {
        Self::parse_line(entry, position)?.ok_or_else(|| {
            VaultError::Invalid(format!("record {}: empty primary field", position))
        })
    }

    /// Render as `primary` or `primary|secondary`
    pub fn to_line(&self, include_secondary: bool) -> String {
        match (&self.secondary, include_secondary) {
            (Some(secondary), true) => {
                format!("{}{}{}", self.primary, FIELD_SEPARATOR, secondary)
            }
            _ => self.primary.clone(),
        }
    }
}

/// A record together with its position in the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub index: u64,
    pub record: Record,
}

/// Parse a whole import file, skipping blank lines
pub fn parse_lines(text: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(record) = Record::parse_line(line, i + 1)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Parse API entries; any blank or malformed entry rejects the whole batch
pub fn parse_entries<S: AsRef<str>>(entries: &[S]) -> Result<Vec<Record>> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| Record::parse_entry(entry.as_ref(), i + 1))
        .collect()
}

/// Check every record against the rules of `kind`
pub fn validate_records(kind: ListKind, records: &[Record]) -> Result<()> {
    for (i, record) in records.iter().enumerate() {
        if record.primary.trim().is_empty() {
            return Err(VaultError::Invalid(format!(
                "record {}: empty primary field",
                i + 1
            )));
        }
        if kind == ListKind::Proxies {
            validate_proxy(&record.primary).map_err(|e| match e {
                VaultError::Invalid(msg) => VaultError::Invalid(format!("record {}: {}", i + 1, msg)),
                other => other,
            })?;
        }
    }
    Ok(())
}
