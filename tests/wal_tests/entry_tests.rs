//! Tests for WAL Entry serialization and deserialization
//!
//! These tests verify:
//! - Round-trip serialization of multi-operation entries
//! - CRC32 corruption detection
//! - Edge cases (truncation, garbage lengths, mismatched LSNs)

use listvault::kv::{FieldMap, StoredEntry, StoredValue};
use listvault::wal::{Operation, WalEntry, HEADER_SIZE};
use listvault::VaultError;

use super::{delete, put};

// =============================================================================
// Serialization Round-Trip Tests
// =============================================================================

#[test]
fn test_serialize_deserialize_mixed_operations() {
    let mut fields = FieldMap::new();
    fields.insert("total".to_string(), "3".to_string());
    fields.insert("createdAt".to_string(), "2024-01-01T00:00:00.000Z".to_string());

    let entry = WalEntry::new(
        7,
        vec![
            put("upload:a:chunk:0", "x|y"),
            Operation::Put {
                key: "list:abc".to_string(),
                entry: StoredEntry {
                    value: StoredValue::Hash(fields),
                    expires_at: Some(1_700_000_000_000),
                },
            },
            delete("upload:a:chunk:1"),
        ],
    );

    let bytes = entry.serialize().unwrap();
    let (recovered, consumed) = WalEntry::deserialize(&bytes).unwrap();

    assert_eq!(recovered, entry);
    assert_eq!(consumed, bytes.len());
}

#[test]
fn test_deserialize_reports_consumed_bytes_for_concatenated_entries() {
    let first = WalEntry::new(1, vec![put("a", "1")]);
    let second = WalEntry::new(2, vec![delete("a")]);

    let mut bytes = first.serialize().unwrap();
    let first_len = bytes.len();
    bytes.extend(second.serialize().unwrap());

    let (a, used) = WalEntry::deserialize(&bytes).unwrap();
    assert_eq!(a, first);
    assert_eq!(used, first_len);

    let (b, _) = WalEntry::deserialize(&bytes[used..]).unwrap();
    assert_eq!(b, second);
}

#[test]
fn test_serialize_empty_operation_list() {
    let entry = WalEntry::new(3, Vec::new());
    let bytes = entry.serialize().unwrap();
    let (recovered, _) = WalEntry::deserialize(&bytes).unwrap();
    assert!(recovered.operations.is_empty());
}

#[test]
fn test_header_layout() {
    let entry = WalEntry::new(0x0102_0304, vec![put("k", "v")]);
    let bytes = entry.serialize().unwrap();

    let lsn = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;

    assert_eq!(lsn, 0x0102_0304);
    assert_eq!(len, bytes.len() - HEADER_SIZE);
    assert_eq!(crc, WalEntry::compute_crc(&bytes[HEADER_SIZE..]));
}

// =============================================================================
// CRC Corruption Detection Tests
// =============================================================================

#[test]
fn test_crc_corruption_detected() {
    let entry = WalEntry::new(1, vec![put("key", "value")]);
    let mut bytes = entry.serialize().unwrap();

    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(VaultError::WalCorruption(_))));
}

#[test]
fn test_crc_field_corruption_detected() {
    let entry = WalEntry::new(1, vec![put("key", "value")]);
    let mut bytes = entry.serialize().unwrap();
    bytes[8] ^= 0x01;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(VaultError::WalCorruption(_))
    ));
}

#[test]
fn test_header_lsn_mismatch_detected() {
    let entry = WalEntry::new(5, vec![put("key", "value")]);
    let mut bytes = entry.serialize().unwrap();
    bytes[0..8].copy_from_slice(&6u64.to_le_bytes());

    let err = WalEntry::deserialize(&bytes).unwrap_err();
    assert!(matches!(err, VaultError::WalCorruption(msg) if msg.contains("does not match")));
}

// =============================================================================
// Edge Case Tests
// =============================================================================

#[test]
fn test_truncated_header() {
    let bytes = vec![0u8; HEADER_SIZE - 1];
    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(VaultError::WalCorruption(_))
    ));
}

#[test]
fn test_truncated_payload() {
    let entry = WalEntry::new(1, vec![put("key", "a fairly long value")]);
    let bytes = entry.serialize().unwrap();

    let result = WalEntry::deserialize(&bytes[..bytes.len() - 4]);
    assert!(matches!(result, Err(VaultError::WalCorruption(msg)) if msg.contains("incomplete payload")));
}

#[test]
fn test_garbage_length_rejected() {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(VaultError::WalCorruption(msg)) if msg.contains("exceeds maximum")
    ));
}

#[test]
fn test_large_value_round_trip() {
    let big = "x".repeat(1024 * 1024);
    let entry = WalEntry::new(1, vec![put("big", &big)]);
    let bytes = entry.serialize().unwrap();
    let (recovered, _) = WalEntry::deserialize(&bytes).unwrap();
    assert_eq!(recovered, entry);
}
