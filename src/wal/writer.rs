//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, VaultError};

use super::{Operation, WalEntry, WalRecovery, HEADER_SIZE, MAX_ENTRY_SIZE};

/// Room left for an entry's own fields when packing operations by size
const ENTRY_OVERHEAD: usize = 64;

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,

    /// LSN of the last entry written (0 when empty)
    current_lsn: u64,

    sync_strategy: WalSyncStrategy,

    /// Entries written since the last fsync
    unsynced: usize,

    /// Largest payload this writer will append; never above what recovery reads
    max_entry_size: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Scans an existing file to find the last LSN. Use [`WalWriter::resume`]
    /// when recovery already knows it.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let last_lsn = if path.exists() {
            WalRecovery::verify(path)?.last_lsn
        } else {
            0
        };
        Self::resume(path, sync_strategy, last_lsn)
    }

    /// Open for appending, continuing after `last_lsn`
    pub fn resume(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            current_lsn: last_lsn,
            sync_strategy,
            unsynced: 0,
            max_entry_size: MAX_ENTRY_SIZE,
        })
    }

    /// Lower the payload limit (clamped to [`MAX_ENTRY_SIZE`])
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes.min(MAX_ENTRY_SIZE);
        self
    }

    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Append one entry holding `operations`, returning its LSN
    ///
    /// An entry recovery could not read back is refused with
    /// `PayloadTooLarge` and nothing is written.
    pub fn append(&mut self, operations: Vec<Operation>) -> Result<u64> {
        let lsn = self.current_lsn + 1;
        let entry = WalEntry::new(lsn, operations);
        let bytes = entry.serialize()?;

        let size = bytes.len() - HEADER_SIZE;
        if size > self.max_entry_size {
            return Err(VaultError::PayloadTooLarge {
                size,
                limit: self.max_entry_size,
            });
        }

        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        self.current_lsn = lsn;
        self.unsynced += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } if self.unsynced >= count => self.sync()?,
            WalSyncStrategy::EveryNEntries { .. } => {}
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the log with one holding only `operations`
    ///
    /// Writes a sibling file, fsyncs it, and renames it over the log.
    /// Entries hold at most `per_entry` operations and stay under the
    /// writer's size limit. LSNs restart at 1. On error the old log is kept.
    pub fn rewrite(&mut self, operations: Vec<Operation>, per_entry: usize) -> Result<()> {
        self.sync()?;

        let per_entry = per_entry.max(1);
        let byte_budget = self.max_entry_size.saturating_sub(ENTRY_OVERHEAD);
        let tmp_path = self.path.with_extension("compact");
        let last_lsn = {
            let mut tmp = Self::resume(&tmp_path, WalSyncStrategy::EveryNEntries { count: usize::MAX }, 0)?
                .with_max_entry_size(self.max_entry_size);
            // Start from an empty file even if a previous compaction died midway
            tmp.writer.get_ref().set_len(0)?;

            let mut batch = Vec::new();
            let mut batch_bytes = 0usize;
            for op in operations {
                let op_bytes = bincode::serialized_size(&op)? as usize;
                if !batch.is_empty()
                    && (batch.len() >= per_entry || batch_bytes + op_bytes > byte_budget)
                {
                    tmp.append(std::mem::take(&mut batch))?;
                    batch_bytes = 0;
                }
                batch_bytes += op_bytes;
                batch.push(op);
            }
            if !batch.is_empty() {
                tmp.append(batch)?;
            }
            tmp.sync()?;
            tmp.current_lsn
        };

        fs::rename(&tmp_path, &self.path)?;
        *self = Self::resume(&self.path.clone(), self.sync_strategy, last_lsn)?
            .with_max_entry_size(self.max_entry_size);
        Ok(())
    }
}
