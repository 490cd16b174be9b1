//! Upload Module
//!
//! Reassembles a file sent as independent chunk requests.
//!
//! ## Session Lifecycle
//! ```text
//!   Receiving ──(chunk i < n-1)──► Receiving
//!       │
//!   (chunk n-1)
//!       ▼
//!   Assembling ──► Complete   list created, chunk keys deleted
//!       │
//!       └────────► Failed     nothing created, chunk keys swept
//! ```
//! Chunks live under `upload:{name}:{i}` with a TTL, so an abandoned session
//! disappears on its own.

mod assembler;

pub use assembler::ChunkAssembler;

use serde::Serialize;

use crate::records::{ListId, ListKind};

/// Where an upload session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Receiving,
    Assembling,
    Complete,
    Failed,
}

/// One chunk of an upload session
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub name: String,
    pub chunk: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub kind: ListKind,
}

impl ChunkUpload {
    pub fn is_final(&self) -> bool {
        self.chunk_index + 1 == self.total_chunks
    }

    /// Percentage reported after this chunk is stored (non-final chunks)
    pub fn progress(&self) -> u8 {
        let pct = (self.chunk_index as u64 + 1) * 100 / self.total_chunks.max(1) as u64;
        pct.min(95) as u8
    }
}

/// Acknowledgement of a stored chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub state: UploadState,
    pub is_complete: bool,
    pub progress: u8,
    pub total: Option<u64>,
    pub id: Option<ListId>,
}

impl ChunkReceipt {
    fn receiving(progress: u8) -> Self {
        Self {
            state: UploadState::Receiving,
            is_complete: false,
            progress,
            total: None,
            id: None,
        }
    }

    fn complete(id: ListId, total: u64) -> Self {
        Self {
            state: UploadState::Complete,
            is_complete: true,
            progress: 100,
            total: Some(total),
            id: Some(id),
        }
    }
}
