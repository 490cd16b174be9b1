//! Write-Ahead Log
//!
//! The durability layer under `DurableKv`. Every pipeline that changes state
//! becomes one log entry, written (and, depending on the sync strategy,
//! fsynced) before the in-memory map is touched. On open the log is verified
//! and replayed; a torn final entry is cut off, anything worse is an error.
//!
//! ## Entry layout
//! ```text
//!   offset  0   lsn        u64 LE
//!   offset  8   crc32      u32 LE   (over the payload only)
//!   offset 12   len        u32 LE
//!   offset 16   payload    bincode(WalEntry { lsn, operations })
//! ```
//! LSNs start at 1 and increase by exactly one per entry. Compaction rewrites
//! the file as a snapshot of live keys with LSNs starting again from 1.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
