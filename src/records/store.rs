//! Record Store
//!
//! Maps a list id to its contiguous sequence of records.
//!
//! ## Layout
//! ```text
//!   list:{id}              { total, createdAt }
//!   list:{id}:rec:{i}      { index, cookie, email? }    for i in 0..total
//! ```
//! `total` is the only enumeration bound: reads are lookups by index, never
//! key scans. Appends write the new records and the new `total` in a single
//! pipeline so a reader can never see one without the other.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::error::{Result, VaultError};
use crate::kv::{FieldMap, KvStore, Pipeline};
use crate::layout;

use super::{ListId, Record, StoredRecord};

const FIELD_TOTAL: &str = "total";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_INDEX: &str = "index";
const FIELD_PRIMARY: &str = "cookie";
const FIELD_SECONDARY: &str = "email";

/// Per-list metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMeta {
    pub total: u64,
    pub created_at: String,
}

/// Record storage on top of a key-value store
pub struct RecordStore {
    kv: Arc<dyn KvStore>,

    /// Commands per read/delete pipeline
    batch_size: usize,
}

impl RecordStore {
    pub fn new(kv: Arc<dyn KvStore>, batch_size: usize) -> Self {
        Self {
            kv,
            batch_size: batch_size.max(1),
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Create an empty list; fails with `Conflict` if `id` already has one
    pub fn create_list(&self, id: &ListId) -> Result<ListMeta> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let created = self.kv.hset_nx(
            &layout::list_meta_key(id),
            vec![
                (FIELD_TOTAL.to_string(), "0".to_string()),
                (FIELD_CREATED_AT.to_string(), created_at.clone()),
            ],
        )?;

        if !created {
            return Err(VaultError::Conflict(format!("list {} already exists", id)));
        }

        tracing::debug!(list = %id, "Created list metadata");
        Ok(ListMeta {
            total: 0,
            created_at,
        })
    }

    pub fn metadata(&self, id: &ListId) -> Result<ListMeta> {
        let fields = self
            .kv
            .hgetall(&layout::list_meta_key(id))?
            .ok_or_else(|| VaultError::NotFound(format!("list {}", id)))?;
        decode_meta(id, &fields)
    }

    pub fn total(&self, id: &ListId) -> Result<u64> {
        Ok(self.metadata(id)?.total)
    }

    pub fn exists(&self, id: &ListId) -> Result<bool> {
        self.kv.exists(&layout::list_meta_key(id))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append records at `[total, total + n)` and return the new total
    ///
    /// Callers serialize appends to the same list.
    pub fn append_records(&self, id: &ListId, records: &[Record]) -> Result<u64> {
        check_primaries(records)?;
        let total = self.total(id)?;
        if records.is_empty() {
            return Ok(total);
        }
        self.write_at(id, total, records)
    }

    /// Write records at `[start, start + n)` and set `total` to `start + n`
    ///
    /// Records and the new total go out in one pipeline. Repeating the same
    /// call is harmless, which makes a batch safe to retry when its reply was
    /// lost. One empty primary rejects the whole batch before anything is
    /// written.
    pub fn write_at(&self, id: &ListId, start: u64, records: &[Record]) -> Result<u64> {
        check_primaries(records)?;
        if !self.exists(id)? {
            return Err(VaultError::NotFound(format!("list {}", id)));
        }

        let new_total = start + records.len() as u64;
        let mut pipeline = Pipeline::with_capacity(records.len() + 1);
        for (offset, record) in records.iter().enumerate() {
            let index = start + offset as u64;
            pipeline.hset(layout::record_key(id, index), encode_record(index, record));
        }
        pipeline.hset(
            layout::list_meta_key(id),
            vec![(FIELD_TOTAL.to_string(), new_total.to_string())],
        );

        for reply in self.kv.execute(&pipeline)? {
            reply.into_ok()?;
        }

        tracing::debug!(list = %id, start, appended = records.len(), total = new_total, "Wrote records");
        Ok(new_total)
    }

    /// Remove every record and then the metadata; `false` if the list was absent
    pub fn delete_list(&self, id: &ListId) -> Result<bool> {
        let record_keys = match self.metadata(id) {
            Ok(meta) => (0..meta.total).map(|i| layout::record_key(id, i)).collect(),
            Err(VaultError::NotFound(_)) => return Ok(false),
            Err(VaultError::Corrupt(reason)) => {
                // No trustworthy bound; fall back to enumerating the keys
                tracing::warn!(list = %id, %reason, "Deleting list with corrupt metadata by key scan");
                self.kv.keys(&layout::record_pattern(id))?
            }
            Err(e) => return Err(e),
        };

        let mut removed = 0i64;
        for batch in record_keys.chunks(self.batch_size) {
            removed += self.kv.del(batch.to_vec())?;
        }
        self.kv.del(vec![layout::list_meta_key(id)])?;

        tracing::debug!(list = %id, removed, "Deleted list records");
        Ok(true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch records in `[start, end)` with batched `HGETALL` pipelines
    ///
    /// Absent records are omitted; malformed ones are `Corrupt`.
    pub fn read_range(&self, id: &ListId, start: u64, end: u64) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::with_capacity(end.saturating_sub(start) as usize);
        let mut batch_start = start;

        while batch_start < end {
            let batch_end = end.min(batch_start + self.batch_size as u64);

            let mut pipeline = Pipeline::with_capacity((batch_end - batch_start) as usize);
            for index in batch_start..batch_end {
                pipeline.hgetall(layout::record_key(id, index));
            }

            let replies = self.kv.execute(&pipeline)?;
            for (index, reply) in (batch_start..batch_end).zip(replies) {
                if let Some(fields) = reply.into_hash()? {
                    records.push(decode_record(id, index, &fields)?);
                }
            }

            batch_start = batch_end;
        }

        Ok(records)
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn check_primaries(records: &[Record]) -> Result<()> {
    match records.iter().position(|r| r.primary.trim().is_empty()) {
        Some(pos) => Err(VaultError::Invalid(format!(
            "record {}: empty primary field",
            pos + 1
        ))),
        None => Ok(()),
    }
}

fn encode_record(index: u64, record: &Record) -> Vec<(String, String)> {
    let mut fields = vec![
        (FIELD_INDEX.to_string(), index.to_string()),
        (FIELD_PRIMARY.to_string(), record.primary.clone()),
    ];
    if let Some(secondary) = &record.secondary {
        fields.push((FIELD_SECONDARY.to_string(), secondary.clone()));
    }
    fields
}

fn decode_record(id: &ListId, index: u64, fields: &FieldMap) -> Result<StoredRecord> {
    let stored_index: u64 = fields
        .get(FIELD_INDEX)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            VaultError::Corrupt(format!("list {} record {}: missing or bad index", id, index))
        })?;
    if stored_index != index {
        return Err(VaultError::Corrupt(format!(
            "list {} record {}: stored index is {}",
            id, index, stored_index
        )));
    }

    let primary = fields
        .get(FIELD_PRIMARY)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            VaultError::Corrupt(format!("list {} record {}: missing primary field", id, index))
        })?;

    Ok(StoredRecord {
        index,
        record: Record {
            primary: primary.clone(),
            secondary: fields.get(FIELD_SECONDARY).filter(|v| !v.is_empty()).cloned(),
        },
    })
}

fn decode_meta(id: &ListId, fields: &FieldMap) -> Result<ListMeta> {
    let total = fields
        .get(FIELD_TOTAL)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| VaultError::Corrupt(format!("list {}: missing or bad total", id)))?;
    let created_at = fields
        .get(FIELD_CREATED_AT)
        .cloned()
        .ok_or_else(|| VaultError::Corrupt(format!("list {}: missing createdAt", id)))?;

    Ok(ListMeta { total, created_at })
}
