//! List Service
//!
//! Entry point for every list operation. Coordinates the Record Store (content),
//! the Directory (existence and names), the per-list locks and the chunk
//! assembler.
//!
//! ## Ordering
//! - Create: reserve name → create metadata → import → insert directory entry
//! - Delete: records → metadata → directory entry → name
//! - Rename: directory only (record keys are scoped by the immutable id)

use std::io::Write;
use std::sync::Arc;

use crate::config::Config;
use crate::directory::{validate_name, Directory, ListEntry};
use crate::error::{Result, VaultError};
use crate::kv::KvStore;
use crate::locks::ListLocks;
use crate::pagination::{Page, PageRequest};
use crate::records::{validate_records, ListId, ListKind, Record, RecordStore};
use crate::retry::RetryPolicy;
use crate::upload::{ChunkAssembler, ChunkReceipt, ChunkUpload};

/// The list ingestion and storage engine
pub struct ListService {
    config: Config,
    kv: Arc<dyn KvStore>,
    records: RecordStore,
    directory: Directory,
    assembler: ChunkAssembler,
    locks: ListLocks,
    retry: RetryPolicy,
}

impl ListService {
    /// Build a service on top of `kv`
    pub fn new(kv: Arc<dyn KvStore>, config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            records: RecordStore::new(Arc::clone(&kv), config.read_batch_size),
            directory: Directory::new(Arc::clone(&kv), config.read_batch_size),
            assembler: ChunkAssembler::new(Arc::clone(&kv), &config),
            locks: ListLocks::new(),
            retry: RetryPolicy::from_config(&config),
            kv,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn list_all(&self) -> Result<Vec<ListEntry>> {
        self.directory.list_all()
    }

    pub fn resolve(&self, name_or_id: &str) -> Result<ListEntry> {
        self.directory.resolve(name_or_id)
    }

    /// One page of a list
    pub fn get_page(&self, name_or_id: &str, request: PageRequest) -> Result<(ListEntry, Page)> {
        let window = request.resolve(&self.config)?;
        let mut entry = self.directory.resolve(name_or_id)?;

        let total = self.records.total(&entry.id)?;
        entry.total = total;

        let (start, end) = window.bounds(total);
        let records = self.records.read_range(&entry.id, start, end)?;

        Ok((
            entry,
            Page {
                records,
                total,
                pagination: window.pagination(total),
            },
        ))
    }

    /// Write every record as a line, in batches; returns the number written
    pub fn export<W: Write>(
        &self,
        name_or_id: &str,
        include_secondary: bool,
        out: &mut W,
    ) -> Result<u64> {
        let entry = self.directory.resolve(name_or_id)?;
        let total = self.records.total(&entry.id)?;
        let batch = self.config.read_batch_size as u64;

        let mut written = 0;
        let mut start = 0;
        while start < total {
            let end = total.min(start + batch);
            for stored in self.records.read_range(&entry.id, start, end)? {
                writeln!(out, "{}", stored.record.to_line(include_secondary))?;
                written += 1;
            }
            start = end;
        }

        Ok(written)
    }

    /// The whole list as text, one record per line
    pub fn download(&self, name_or_id: &str, include_secondary: bool) -> Result<String> {
        let mut buf = Vec::new();
        self.export(name_or_id, include_secondary, &mut buf)?;
        String::from_utf8(buf).map_err(|e| VaultError::Corrupt(e.to_string()))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a list, importing `records` if any
    ///
    /// The directory entry is written last, with the final total, so a list
    /// is never listed or readable while its import is still running.
    pub fn create_list(
        &self,
        name: &str,
        kind: ListKind,
        records: Vec<Record>,
    ) -> Result<ListEntry> {
        validate_name(name)?;
        validate_records(kind, &records)?;

        let id = ListId::generate();
        self.directory.reserve_name(name, &id)?;

        let meta = match self.records.create_list(&id) {
            Ok(meta) => meta,
            Err(e) => {
                self.discard(&id, name);
                return Err(e);
            }
        };

        let total = if records.is_empty() {
            0
        } else {
            self.bulk_import(&id, name, &records)?
        };

        let entry = ListEntry {
            id: id.clone(),
            name: name.to_string(),
            kind,
            total,
            created_at: meta.created_at,
        };
        if let Err(e) = self.directory.insert(&entry) {
            self.discard(&id, name);
            return Err(e);
        }

        tracing::info!(list = %id, name, kind = %kind, total, "Created list");
        Ok(entry)
    }

    /// Import records into a list that is not yet in the directory
    ///
    /// Batches are retried; on failure everything under `id` is removed and
    /// `name` released.
    pub fn bulk_import(&self, id: &ListId, name: &str, records: &[Record]) -> Result<u64> {
        let result = {
            let _guard = self.locks.lock(id);
            self.import_batches(id, records)
        };

        match result {
            Ok(total) => Ok(total),
            Err(e) => {
                tracing::warn!(list = %id, error = %e, "Bulk import failed, removing list");
                self.discard(id, name);
                Err(e)
            }
        }
    }

    fn import_batches(&self, id: &ListId, records: &[Record]) -> Result<u64> {
        let mut total = self.records.total(id)?;

        for batch in records.chunks(self.config.append_batch_size) {
            let start = total;
            total = self
                .retry
                .run("append batch", || self.records.write_at(id, start, batch))?;
            tracing::debug!(list = %id, total, of = records.len(), "Imported batch");
        }

        Ok(total)
    }

    /// Append records to an existing list; returns the new total
    pub fn append(&self, name_or_id: &str, records: Vec<Record>) -> Result<u64> {
        let entry = self.directory.resolve(name_or_id)?;
        validate_records(entry.kind, &records)?;

        let _guard = self.locks.lock(&entry.id);
        let total = self.records.append_records(&entry.id, &records)?;
        self.directory.set_total(&entry.id, total)?;

        tracing::info!(list = %entry.id, appended = records.len(), total, "Appended to list");
        Ok(total)
    }

    /// Rename a list; the records are not touched
    pub fn rename(&self, name_or_id: &str, new_name: &str) -> Result<ListEntry> {
        let entry = self.directory.resolve(name_or_id)?;
        let _guard = self.locks.lock(&entry.id);
        self.directory.rename(&entry.id, new_name)
    }

    /// Delete a list; `false` if there was nothing to delete
    ///
    /// A list whose directory entry no longer decodes is still deleted.
    pub fn delete(&self, name_or_id: &str) -> Result<bool> {
        let id = match self.directory.resolve(name_or_id) {
            Ok(entry) => entry.id,
            Err(VaultError::NotFound(_)) => return Ok(false),
            Err(VaultError::Corrupt(reason)) => match self.directory.locate(name_or_id)? {
                Some(id) => {
                    tracing::warn!(list = %id, reason = %reason, "Deleting list with malformed directory entry");
                    id
                }
                None => return Err(VaultError::Corrupt(reason)),
            },
            Err(e) => return Err(e),
        };

        {
            let _guard = self.locks.lock(&id);
            self.records.delete_list(&id)?;
            self.directory.remove(&id)?;
            self.directory.release_name(name_or_id, &id)?;
        }
        self.locks.forget(&id);

        tracing::info!(list = %id, "Deleted list");
        Ok(true)
    }

    /// Accept one chunk of an upload session
    pub fn upload_chunk(&self, upload: &ChunkUpload) -> Result<ChunkReceipt> {
        self.assembler
            .receive(&self.directory, upload, |name, kind, records| {
                self.create_list(name, kind, records)
            })
    }

    /// Best-effort removal of everything belonging to `id`
    fn discard(&self, id: &ListId, name: &str) {
        self.locks.forget(id);
        if let Err(e) = self.records.delete_list(id) {
            tracing::warn!(list = %id, error = %e, "Failed to delete records during cleanup");
        }
        if let Err(e) = self.directory.remove(id) {
            tracing::warn!(list = %id, error = %e, "Failed to remove directory entry during cleanup");
        }
        if let Err(e) = self.directory.release_name(name, id) {
            tracing::warn!(list = %id, name, error = %e, "Failed to release name during cleanup");
        }
    }
}
