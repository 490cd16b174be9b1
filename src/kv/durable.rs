//! Durable key-value backend
//!
//! Coordinates the WAL and the in-memory map.
//!
//! ## Responsibilities
//! - Log every mutating pipeline before applying it
//! - Replay the WAL on startup
//! - Compact the WAL into a snapshot of live keys when it grows

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::{KvReply, KvStore, MemoryKv, Pipeline};

/// Operations per entry when compaction rewrites the log
const COMPACTION_BATCH: usize = 1024;

/// Key-value store persisted through a write-ahead log
///
/// ## Concurrency Model
///
/// - **Mutations**: the `wal` mutex is taken inside the memory write lock,
///   so log order always matches apply order.
/// - **Reads**: read-only pipelines only take the memory read lock and
///   never touch the WAL.
pub struct DurableKv {
    /// Directory holding the WAL
    data_dir: PathBuf,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Current state (internal RwLock)
    memory: MemoryKv,
}

impl DurableKv {
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create a store under `config.data_dir`
    ///
    /// On startup:
    /// 1. Create data directory
    /// 2. Recover from WAL if it exists (truncating a damaged tail)
    /// 3. Replay recovered entries into memory
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let memory = MemoryKv::new();

        let last_lsn = if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    "WAL recovery complete"
                );
            }

            for entry in entries {
                memory.apply(entry.operations);
            }
            recovery.last_lsn
        } else {
            0
        };

        let wal = WalWriter::resume(&wal_path, config.wal_sync_strategy, last_lsn)?;

        Ok(Self {
            data_dir: config.data_dir.clone(),
            wal: Mutex::new(wal),
            memory,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(&config)
    }

    /// Rewrite the WAL as one `Put` per live key
    pub fn compact(&self) -> Result<()> {
        // Memory lock before WAL lock, same order as `execute`
        let count = self.memory.with_snapshot(|entries| {
            let operations: Vec<Operation> = entries
                .into_iter()
                .map(|(key, entry)| Operation::Put { key, entry })
                .collect();
            let count = operations.len();
            self.wal.lock().rewrite(operations, COMPACTION_BATCH)?;
            Ok(count)
        })?;

        tracing::info!(keys = count, "WAL compacted");
        Ok(())
    }

    /// Flush and fsync the WAL
    pub fn sync(&self) -> Result<()> {
        self.wal.lock().sync()
    }

    /// Close the store gracefully
    pub fn close(self) -> Result<()> {
        let mut wal = self.wal.into_inner();
        wal.sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(Self::WAL_FILENAME)
    }

    pub fn current_lsn(&self) -> u64 {
        self.wal.lock().current_lsn()
    }

    pub fn entry_count(&self) -> usize {
        self.memory.entry_count()
    }
}

impl KvStore for DurableKv {
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<KvReply>> {
        self.memory.execute_logged(pipeline, |operations| {
            self.wal.lock().append(operations.to_vec()).map(|_| ())
        })
    }

    fn purge_expired(&self) -> Result<usize> {
        self.memory.purge_logged(|operations| {
            self.wal.lock().append(operations.to_vec()).map(|_| ())
        })
    }
}
