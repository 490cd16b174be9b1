//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::kv::{now_millis, StoredEntry};

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload accepted when decoding (guards against garbage lengths)
pub const MAX_ENTRY_SIZE: usize = 512 * 1024 * 1024;

/// A single entry in the WAL
///
/// One entry holds every operation produced by one pipeline, so a torn
/// write drops the whole pipeline rather than part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing, starting at 1
    pub lsn: u64,

    /// The operations to apply, in order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Install a value (with its absolute expiry)
    Put { key: String, entry: StoredEntry },

    /// Delete a key
    Delete { key: String },
}

impl WalEntry {
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        Self {
            lsn,
            operations,
            timestamp: now_millis(),
        }
    }

    /// Encode as `LSN | CRC | Len | payload`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let crc = Self::compute_crc(&payload);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode one entry from the front of `bytes`, returning it and the
    /// number of bytes consumed
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(VaultError::WalCorruption(format!(
                "incomplete header: {} bytes",
                bytes.len()
            )));
        }

        let (lsn, crc, len) = Self::parse_header(&bytes[..HEADER_SIZE])?;
        let end = HEADER_SIZE + len;
        if bytes.len() < end {
            return Err(VaultError::WalCorruption(format!(
                "incomplete payload at lsn {}: expected {} bytes, got {}",
                lsn,
                len,
                bytes.len() - HEADER_SIZE
            )));
        }

        let entry = Self::decode_payload(lsn, crc, &bytes[HEADER_SIZE..end])?;
        Ok((entry, end))
    }

    /// Split a header into (lsn, crc, payload_len)
    pub(crate) fn parse_header(header: &[u8]) -> Result<(u64, u32, usize)> {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&header[0..8]);
        crc.copy_from_slice(&header[8..12]);
        len.copy_from_slice(&header[12..16]);

        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_ENTRY_SIZE {
            return Err(VaultError::WalCorruption(format!(
                "entry length {} exceeds maximum {}",
                len, MAX_ENTRY_SIZE
            )));
        }
        Ok((u64::from_le_bytes(lsn), u32::from_le_bytes(crc), len))
    }

    /// Verify the checksum and decode the payload
    pub(crate) fn decode_payload(lsn: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(payload);
        if actual != crc {
            return Err(VaultError::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:08x}, computed {:08x}",
                lsn, crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)
            .map_err(|e| VaultError::WalCorruption(format!("undecodable entry at lsn {}: {}", lsn, e)))?;
        if entry.lsn != lsn {
            return Err(VaultError::WalCorruption(format!(
                "header lsn {} does not match payload lsn {}",
                lsn, entry.lsn
            )));
        }
        Ok(entry)
    }

    pub fn compute_crc(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }
}
