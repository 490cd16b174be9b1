//! List Directory
//!
//! System of record for which lists exist and what they are called.
//!
//! ## Layout
//! ```text
//!   dir:list:{id}     { id, name, kind, total, createdAt }
//!   dir:name:{name}   id      (set-if-absent, so names are unique)
//! ```
//! Record content lives in the Record Store; the directory holds only the
//! listing view, so a rename touches two small keys regardless of list size.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{Result, VaultError};
use crate::kv::{FieldMap, KvStore, Pipeline};
use crate::layout;
use crate::records::{ListId, ListKind};

/// Longest accepted list name (in bytes)
pub const MAX_NAME_LEN: usize = 256;

/// One row of the list index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub id: ListId,
    pub name: String,
    pub kind: ListKind,
    pub total: u64,
    pub created_at: String,
}

impl ListEntry {
    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.id.to_string()),
            ("name".to_string(), self.name.clone()),
            ("kind".to_string(), self.kind.to_string()),
            ("total".to_string(), self.total.to_string()),
            ("createdAt".to_string(), self.created_at.clone()),
        ]
    }

    fn from_fields(key: &str, fields: &FieldMap) -> Result<Self> {
        let field = |name: &str| {
            fields.get(name).ok_or_else(|| {
                VaultError::Corrupt(format!("directory entry {} missing {}", key, name))
            })
        };

        let total = field("total")?
            .parse()
            .map_err(|_| VaultError::Corrupt(format!("directory entry {} has bad total", key)))?;
        let kind = match fields.get("kind") {
            Some(kind) => kind.parse()?,
            None => ListKind::default(),
        };

        Ok(Self {
            id: ListId::new(field("id")?.clone()),
            name: field("name")?.clone(),
            kind,
            total,
            created_at: normalize_timestamp(field("createdAt")?),
        })
    }
}

/// Index of lists by id and by name
pub struct Directory {
    kv: Arc<dyn KvStore>,
    batch_size: usize,
}

impl Directory {
    pub fn new(kv: Arc<dyn KvStore>, batch_size: usize) -> Self {
        Self {
            kv,
            batch_size: batch_size.max(1),
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Every list, newest first (ties broken by id)
    ///
    /// Entries that fail to decode are logged and left out of the listing.
    pub fn list_all(&self) -> Result<Vec<ListEntry>> {
        let keys = self.kv.keys(layout::DIR_ENTRY_PATTERN)?;
        let mut entries = Vec::with_capacity(keys.len());

        for batch in keys.chunks(self.batch_size) {
            let mut pipeline = Pipeline::with_capacity(batch.len());
            for key in batch {
                pipeline.hgetall(key.as_str());
            }

            for (key, reply) in batch.iter().zip(self.kv.execute(&pipeline)?) {
                let Some(fields) = reply.into_hash()? else {
                    continue;
                };
                match ListEntry::from_fields(key, &fields) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => tracing::warn!(key = %key, error = %e, "Skipping malformed directory entry"),
                }
            }
        }

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    pub fn get(&self, id: &ListId) -> Result<Option<ListEntry>> {
        let key = layout::dir_entry_key(id.as_str());
        match self.kv.hgetall(&key)? {
            Some(fields) => Ok(Some(ListEntry::from_fields(&key, &fields)?)),
            None => Ok(None),
        }
    }

    /// Id currently holding `name`
    pub fn lookup_name(&self, name: &str) -> Result<Option<ListId>> {
        Ok(self.kv.get(&layout::dir_name_key(name))?.map(ListId::new))
    }

    /// Id that `name_or_id` refers to, without decoding the entry
    pub fn locate(&self, name_or_id: &str) -> Result<Option<ListId>> {
        let id = ListId::new(name_or_id);
        if self.kv.hgetall(&layout::dir_entry_key(id.as_str()))?.is_some() {
            return Ok(Some(id));
        }
        self.lookup_name(name_or_id)
    }

    /// Find a list by id, falling back to its name
    pub fn resolve(&self, name_or_id: &str) -> Result<ListEntry> {
        if let Some(entry) = self.get(&ListId::new(name_or_id))? {
            return Ok(entry);
        }
        if let Some(id) = self.lookup_name(name_or_id)? {
            if let Some(entry) = self.get(&id)? {
                return Ok(entry);
            }
        }
        Err(VaultError::NotFound(format!("list {:?}", name_or_id)))
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Claim `name` for `id`; `Conflict` if another list holds it
    pub fn reserve_name(&self, name: &str, id: &ListId) -> Result<()> {
        validate_name(name)?;
        if self.kv.set_nx(&layout::dir_name_key(name), id.as_str())? {
            Ok(())
        } else {
            Err(VaultError::Conflict(format!("list name {:?} is already in use", name)))
        }
    }

    /// Release `name` if it is still reserved for `id`
    pub fn release_name(&self, name: &str, id: &ListId) -> Result<bool> {
        let key = layout::dir_name_key(name);
        match self.kv.get(&key)? {
            Some(owner) if owner == id.as_str() => Ok(self.kv.del(vec![key])? > 0),
            _ => Ok(false),
        }
    }

    // =========================================================================
    // Entries
    // =========================================================================

    pub fn insert(&self, entry: &ListEntry) -> Result<()> {
        self.kv
            .hset(&layout::dir_entry_key(entry.id.as_str()), entry.to_fields())
    }

    /// Give `id` a new display name
    ///
    /// The new name is reserved before anything else changes, so a taken name
    /// leaves the list untouched.
    pub fn rename(&self, id: &ListId, new_name: &str) -> Result<ListEntry> {
        let mut entry = self
            .get(id)?
            .ok_or_else(|| VaultError::NotFound(format!("list {}", id)))?;
        if entry.name == new_name {
            return Ok(entry);
        }

        self.reserve_name(new_name, id)?;

        let update = vec![("name".to_string(), new_name.to_string())];
        if let Err(e) = self.kv.hset(&layout::dir_entry_key(id.as_str()), update) {
            if let Err(release_err) = self.release_name(new_name, id) {
                tracing::warn!(list = %id, name = new_name, error = %release_err, "Failed to release name after failed rename");
            }
            return Err(e);
        }

        let old_name = std::mem::replace(&mut entry.name, new_name.to_string());
        if let Err(e) = self.release_name(&old_name, id) {
            tracing::warn!(list = %id, name = %old_name, error = %e, "Failed to release old name");
        }

        tracing::info!(list = %id, from = %old_name, to = new_name, "Renamed list");
        Ok(entry)
    }

    pub fn set_total(&self, id: &ListId, total: u64) -> Result<()> {
        self.kv.hset(
            &layout::dir_entry_key(id.as_str()),
            vec![("total".to_string(), total.to_string())],
        )
    }

    /// Drop the entry and its name; `false` if there was no entry
    ///
    /// Works on the raw fields, so an entry that no longer decodes is
    /// removed as well.
    pub fn remove(&self, id: &ListId) -> Result<bool> {
        let key = layout::dir_entry_key(id.as_str());
        let Some(fields) = self.kv.hgetall(&key)? else {
            return Ok(false);
        };
        self.kv.del(vec![key])?;
        if let Some(name) = fields.get("name") {
            self.release_name(name, id)?;
        }
        Ok(true)
    }
}

/// Reject names that cannot be a list's display name
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::Invalid("list name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VaultError::Invalid(format!(
            "list name longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(VaultError::Invalid("list name contains control characters".into()));
    }
    Ok(())
}

/// Canonical RFC 3339 (UTC, millisecond precision)
///
/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC); anything
/// else becomes the current time.
pub fn normalize_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc()));

    match parsed {
        Ok(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        Err(_) => now_timestamp(),
    }
}

/// Current time in canonical form
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
