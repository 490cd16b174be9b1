//! Chunk Assembler
//!
//! Buffers chunks in the key-value store and, when the final chunk arrives,
//! reads them all back, parses the file and hands the records over to be
//! stored as a new list.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::directory::{validate_name, Directory, ListEntry};
use crate::error::{Result, VaultError};
use crate::kv::KvStore;
use crate::layout;
use crate::records::{parse_lines, ListKind, Record};
use crate::retry::RetryPolicy;

use super::{ChunkReceipt, ChunkUpload, UploadState};

/// Reassembles chunked uploads
pub struct ChunkAssembler {
    kv: Arc<dyn KvStore>,
    retry: RetryPolicy,
    chunk_ttl: Duration,
    max_chunk_bytes: usize,
}

impl ChunkAssembler {
    pub fn new(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self {
            kv,
            retry: RetryPolicy::from_config(config),
            chunk_ttl: config.chunk_ttl,
            max_chunk_bytes: config.max_chunk_bytes,
        }
    }

    /// Store one chunk; on the final chunk assemble the file and call `finish`
    ///
    /// `finish` creates the list from the parsed records. Whatever goes wrong
    /// once assembly has started, the session's chunk keys are swept.
    pub fn receive<F>(
        &self,
        directory: &Directory,
        upload: &ChunkUpload,
        finish: F,
    ) -> Result<ChunkReceipt>
    where
        F: FnOnce(&str, ListKind, Vec<Record>) -> Result<ListEntry>,
    {
        validate(upload)?;

        if directory.lookup_name(&upload.name)?.is_some() {
            return Err(name_in_use(&upload.name));
        }

        let size = upload.chunk.len();
        if size > self.max_chunk_bytes {
            return Err(VaultError::PayloadTooLarge {
                size,
                limit: self.max_chunk_bytes,
            });
        }

        let key = layout::upload_chunk_key(&upload.name, upload.chunk_index);
        self.retry.run("store chunk", || {
            self.kv.set_ex(&key, &upload.chunk, self.chunk_ttl)
        })?;

        tracing::debug!(
            name = %upload.name,
            chunk = upload.chunk_index,
            total_chunks = upload.total_chunks,
            bytes = size,
            "Stored upload chunk"
        );

        if !upload.is_final() {
            return Ok(ChunkReceipt::receiving(upload.progress()));
        }

        match self.assemble(upload, finish) {
            Ok(entry) => {
                self.sweep(&upload.name);
                tracing::info!(
                    name = %upload.name,
                    list = %entry.id,
                    total = entry.total,
                    state = ?UploadState::Complete,
                    "Upload assembled"
                );
                Ok(ChunkReceipt::complete(entry.id, entry.total))
            }
            Err(e) => {
                tracing::warn!(name = %upload.name, state = ?UploadState::Failed, error = %e, "Upload assembly failed");
                self.sweep(&upload.name);
                match e {
                    // Chunks were swept by a concurrent session that took the name
                    VaultError::AssemblyFailed { .. }
                        if matches!(directory.lookup_name(&upload.name), Ok(Some(_))) =>
                    {
                        Err(name_in_use(&upload.name))
                    }
                    e => Err(e),
                }
            }
        }
    }

    fn assemble<F>(&self, upload: &ChunkUpload, finish: F) -> Result<ListEntry>
    where
        F: FnOnce(&str, ListKind, Vec<Record>) -> Result<ListEntry>,
    {
        tracing::debug!(name = %upload.name, state = ?UploadState::Assembling, "Assembling upload");

        let mut text = String::new();
        let mut failed_chunks = Vec::new();

        for index in 0..upload.total_chunks {
            let key = layout::upload_chunk_key(&upload.name, index);
            match self.retry.run("read chunk", || self.kv.get(&key)) {
                Ok(Some(chunk)) => text.push_str(&chunk),
                Ok(None) => failed_chunks.push(index),
                Err(e) => {
                    tracing::warn!(name = %upload.name, chunk = index, error = %e, "Chunk unreadable");
                    failed_chunks.push(index);
                }
            }
        }

        if !failed_chunks.is_empty() {
            return Err(VaultError::AssemblyFailed { failed_chunks });
        }

        let records = parse_lines(&text)?;
        finish(&upload.name, upload.kind, records)
    }

    /// Best-effort removal of every chunk key of a session
    pub fn sweep(&self, name: &str) {
        let result = self
            .kv
            .keys(&layout::upload_session_pattern(name))
            .and_then(|keys| if keys.is_empty() { Ok(0) } else { self.kv.del(keys) });

        match result {
            Ok(removed) => tracing::debug!(name, removed, "Swept upload chunks"),
            Err(e) => tracing::warn!(name, error = %e, "Failed to sweep upload chunks"),
        }
    }
}

fn name_in_use(name: &str) -> VaultError {
    VaultError::Conflict(format!("list name {:?} is already in use", name))
}

fn validate(upload: &ChunkUpload) -> Result<()> {
    validate_name(&upload.name)?;
    if upload.total_chunks == 0 {
        return Err(VaultError::Invalid("totalChunks must be at least 1".into()));
    }
    if upload.chunk_index >= upload.total_chunks {
        return Err(VaultError::Invalid(format!(
            "chunkIndex {} out of range for {} chunks",
            upload.chunk_index, upload.total_chunks
        )));
    }
    Ok(())
}
