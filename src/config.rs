//! Configuration for ListVault
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, VaultError};

/// Main configuration for a ListVault instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the embedded key-value store
    /// Internal structure:
    ///   {data_dir}/
    ///     └── wal.log          (write-ahead log)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address of the key-value service
    pub kv_listen_addr: String,

    /// HTTP listen address of the list API
    pub http_listen_addr: String,

    /// Max concurrent key-value client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Upload Configuration
    // -------------------------------------------------------------------------
    /// Lifetime of a buffered upload chunk
    pub chunk_ttl: Duration,

    /// Largest accepted chunk payload (in bytes)
    pub max_chunk_bytes: usize,

    // -------------------------------------------------------------------------
    // Retry Configuration
    // -------------------------------------------------------------------------
    /// Attempts per store operation before a transient error escapes
    pub retry_attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,

    // -------------------------------------------------------------------------
    // Batching Configuration
    // -------------------------------------------------------------------------
    /// Records per append pipeline during bulk import
    pub append_batch_size: usize,

    /// Commands per read/delete pipeline
    pub read_batch_size: usize,

    /// Page size used when the caller omits one
    pub default_page_size: usize,

    /// Largest page size a caller may request
    pub max_page_size: usize,

    // -------------------------------------------------------------------------
    // Maintenance Configuration
    // -------------------------------------------------------------------------
    /// How often the janitor purges expired keys
    pub janitor_interval: Duration,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./listvault_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            kv_listen_addr: "127.0.0.1:6380".to_string(),
            http_listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            chunk_ttl: Duration::from_secs(60 * 60),
            max_chunk_bytes: 50 * 1024 * 1024, // 50 MB
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            append_batch_size: 1000,
            read_batch_size: 5000,
            default_page_size: 1000,
            max_page_size: 10_000,
            janitor_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(VaultError::Config("retry_attempts must be at least 1".into()));
        }
        if self.append_batch_size == 0 || self.read_batch_size == 0 {
            return Err(VaultError::Config("batch sizes must be non-zero".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(VaultError::Config(format!(
                "default_page_size must be in 1..={}",
                self.max_page_size
            )));
        }
        if self.max_chunk_bytes == 0 {
            return Err(VaultError::Config("max_chunk_bytes must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the key-value service listen address
    pub fn kv_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.kv_listen_addr = addr.into();
        self
    }

    /// Set the HTTP listen address
    pub fn http_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the lifetime of buffered upload chunks
    pub fn chunk_ttl(mut self, ttl: Duration) -> Self {
        self.config.chunk_ttl = ttl;
        self
    }

    /// Set the maximum chunk payload (in bytes)
    pub fn max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.config.max_chunk_bytes = bytes;
        self
    }

    /// Set the number of attempts for retried store operations
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    /// Set the fixed delay between retries
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the number of records per append batch
    pub fn append_batch_size(mut self, size: usize) -> Self {
        self.config.append_batch_size = size;
        self
    }

    /// Set the number of commands per read pipeline
    pub fn read_batch_size(mut self, size: usize) -> Self {
        self.config.read_batch_size = size;
        self
    }

    /// Set the page size used when none is requested
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    /// Set the largest page size a caller may request
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.config.max_page_size = size;
        self
    }

    /// Set the janitor sweep interval
    pub fn janitor_interval(mut self, interval: Duration) -> Self {
        self.config.janitor_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
