//! # ListVault
//!
//! Ingestion and storage engine for large line-oriented record lists:
//! - Chunked uploads reassembled server-side, never buffered in one request
//! - Records stored one hash per index, read back in batched pipelines
//! - Atomic appends, rename by metadata only, idempotent delete
//! - Pluggable key-value backend (in-memory, WAL-backed, or remote over TCP)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HTTP API (axum)                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    ListService                               │
//! │        (per-list locks, bulk import, compensation)           │
//! └──────┬──────────────┬──────────────────┬────────────────────┘
//!        │              │                  │
//!        ▼              ▼                  ▼
//!  ┌───────────┐  ┌─────────────┐  ┌──────────────┐
//!  │  Chunk    │  │   Record    │  │  Directory   │
//!  │ Assembler │  │   Store     │  │ (id ↔ name)  │
//!  └─────┬─────┘  └──────┬──────┘  └──────┬───────┘
//!        └───────────────┼────────────────┘
//!                        ▼
//!               ┌─────────────────┐
//!               │    KvStore      │──── MemoryKv / DurableKv (WAL)
//!               │    (trait)      │──── RemoteKv ──TCP──► listvault-kv
//!               └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod kv;
pub mod wal;
pub mod protocol;
pub mod network;

pub mod layout;
pub mod records;
pub mod directory;
pub mod pagination;
pub mod upload;
pub mod retry;
pub mod locks;
pub mod service;
pub mod janitor;
pub mod http;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, Result, VaultError};
pub use config::Config;
pub use kv::{DurableKv, KvStore, MemoryKv, RemoteKv};
pub use records::{ListId, ListKind, Record};
pub use service::ListService;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ListVault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
