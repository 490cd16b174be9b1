//! Key layout inside the key-value store
//!
//! ```text
//!   list:{id}                    hash    total, createdAt
//!   list:{id}:rec:{index}        hash    index, cookie, email?
//!   upload:{name}:{chunkIndex}   string  raw chunk text (TTL)
//!   dir:list:{id}                hash    id, name, kind, total, createdAt
//!   dir:name:{name}              string  id
//! ```
//!
//! User-supplied segments are escaped so that `:` and glob metacharacters
//! can never make one session's pattern match another session's keys.

use crate::records::ListId;

/// Escape a user-supplied key segment
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '*' => out.push_str("%2A"),
            '?' => out.push_str("%3F"),
            other => out.push(other),
        }
    }
    out
}

// =============================================================================
// Record Store
// =============================================================================

pub fn list_meta_key(id: &ListId) -> String {
    format!("list:{}", escape_segment(id.as_str()))
}

pub fn record_key(id: &ListId, index: u64) -> String {
    format!("list:{}:rec:{}", escape_segment(id.as_str()), index)
}

/// Every record key of one list
pub fn record_pattern(id: &ListId) -> String {
    format!("list:{}:rec:*", escape_segment(id.as_str()))
}

// =============================================================================
// Uploads
// =============================================================================

pub fn upload_chunk_key(name: &str, chunk_index: u32) -> String {
    format!("upload:{}:{}", escape_segment(name), chunk_index)
}

/// Every chunk key of one upload session
pub fn upload_session_pattern(name: &str) -> String {
    format!("upload:{}:*", escape_segment(name))
}

/// Every chunk key of every session
pub const UPLOAD_PATTERN: &str = "upload:*";

// =============================================================================
// Directory
// =============================================================================

pub fn dir_entry_key(id: &str) -> String {
    format!("dir:list:{}", escape_segment(id))
}

pub const DIR_ENTRY_PATTERN: &str = "dir:list:*";

pub fn dir_name_key(name: &str) -> String {
    format!("dir:name:{}", escape_segment(name))
}
