//! Tests for the Chunk Assembler
//!
//! These tests verify:
//! - Multi-chunk assembly into a list
//! - Progress reporting
//! - Equivalence of k-chunk and single-chunk uploads
//! - Missing, expired, and unreadable chunks fail assembly and are swept
//! - Request validation and size limits

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use listvault::kv::{KvStore, MemoryKv};
use listvault::pagination::PageRequest;
use listvault::upload::{ChunkUpload, UploadState};
use listvault::{Config, ErrorKind, ListKind, ListService, VaultError};

use crate::common::{
    chunk, reads_chunk, sample_lines, setup_memory_service, setup_memory_service_with,
    test_config, upload_in_chunks, writes_chunk, FlakyKv,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_flaky_service<F>(filter: F) -> (Arc<FlakyKv>, ListService)
where
    F: Fn(&listvault::kv::Pipeline) -> bool + Send + Sync + 'static,
{
    let memory: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let flaky = Arc::new(FlakyKv::new(memory, 0, filter));
    let store: Arc<dyn KvStore> = flaky.clone();
    let service = ListService::new(store, test_config()).unwrap();
    (flaky, service)
}

// =============================================================================
// Assembly
// =============================================================================

#[test]
fn test_three_chunk_upload_of_2500_lines() {
    let (kv, service) = setup_memory_service();
    let text = sample_lines(2500);

    let receipts = upload_in_chunks(&service, "big", &text, 3).unwrap();

    assert_eq!(receipts[0].progress, 33);
    assert_eq!(receipts[1].progress, 66);
    assert!(!receipts[1].is_complete);
    assert_eq!(receipts[1].state, UploadState::Receiving);

    let last = &receipts[2];
    assert!(last.is_complete);
    assert_eq!(last.state, UploadState::Complete);
    assert_eq!(last.progress, 100);
    assert_eq!(last.total, Some(2500));

    let id = last.id.clone().unwrap();
    let (entry, page) = service
        .get_page(id.as_str(), PageRequest::new(3, 1000))
        .unwrap();
    assert_eq!(entry.name, "big");
    assert_eq!(page.records.len(), 500);
    assert_eq!(page.records[0].index, 2000);
    assert_eq!(page.records[0].record.primary, "token-2000");
    assert!(!page.pagination.has_more);

    // Chunk keys are gone once the list exists
    assert!(kv.keys("upload:*").unwrap().is_empty());
}

#[test]
fn test_k_chunks_equal_single_chunk() {
    let (_kv, service) = setup_memory_service();
    let text = sample_lines(313);

    upload_in_chunks(&service, "single", &text, 1).unwrap();
    upload_in_chunks(&service, "split", &text, 7).unwrap();

    let single = service.download("single", true).unwrap();
    let split = service.download("split", true).unwrap();
    assert_eq!(single, split);
    assert_eq!(single, text);
}

#[test]
fn test_chunks_may_split_lines() {
    let (_kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("cut", "abc|us", 0, 3)).unwrap();
    service.upload_chunk(&chunk("cut", "er@x.io\nde", 1, 3)).unwrap();
    let receipt = service.upload_chunk(&chunk("cut", "f\n", 2, 3)).unwrap();

    assert_eq!(receipt.total, Some(2));
    assert_eq!(service.download("cut", true).unwrap(), "abc|user@x.io\ndef\n");
}

#[test]
fn test_empty_file_creates_empty_list() {
    let (_kv, service) = setup_memory_service();
    let receipt = service.upload_chunk(&chunk("empty", "", 0, 1)).unwrap();

    assert!(receipt.is_complete);
    assert_eq!(receipt.total, Some(0));
    assert_eq!(service.resolve("empty").unwrap().total, 0);
}

#[test]
fn test_chunks_out_of_order() {
    let (_kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("ooo", "b\n", 1, 3)).unwrap();
    service.upload_chunk(&chunk("ooo", "a\n", 0, 3)).unwrap();
    service.upload_chunk(&chunk("ooo", "c\n", 2, 3)).unwrap();

    assert_eq!(service.download("ooo", true).unwrap(), "a\nb\nc\n");
}

#[test]
fn test_proxy_upload_is_validated() {
    let (_kv, service) = setup_memory_service();
    let mut upload = chunk("proxies", "1.2.3.4:80\nnot-a-proxy\n", 0, 1);
    upload.kind = ListKind::Proxies;

    let err = service.upload_chunk(&upload).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(service.resolve("proxies").is_err());
}

// =============================================================================
// Progress
// =============================================================================

#[test]
fn test_progress_values() {
    let progress = |index, total| ChunkUpload {
        name: "p".to_string(),
        chunk: String::new(),
        chunk_index: index,
        total_chunks: total,
        kind: ListKind::Accounts,
    }
    .progress();

    assert_eq!(progress(0, 2), 50);
    assert_eq!(progress(0, 3), 33);
    assert_eq!(progress(1, 3), 66);
    assert_eq!(progress(98, 100), 95);
    assert_eq!(progress(0, 1000), 0);
}

// =============================================================================
// Failed Assembly
// =============================================================================

#[test]
fn test_missing_chunk_fails_and_sweeps() {
    let (kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("gap", "a\n", 0, 3)).unwrap();

    let err = service.upload_chunk(&chunk("gap", "c\n", 2, 3)).unwrap_err();

    match err {
        VaultError::AssemblyFailed { failed_chunks } => assert_eq!(failed_chunks, vec![1]),
        other => panic!("expected AssemblyFailed, got {:?}", other),
    }
    assert!(kv.keys("upload:*").unwrap().is_empty());
    assert!(service.resolve("gap").is_err());
    assert!(service.directory().lookup_name("gap").unwrap().is_none());
}

#[test]
fn test_expired_chunk_fails_assembly() {
    let config = Config::builder()
        .retry_delay(Duration::from_millis(1))
        .chunk_ttl(Duration::from_millis(30))
        .build();
    let (_kv, service) = setup_memory_service_with(config);
    service.upload_chunk(&chunk("slow", "a\n", 0, 2)).unwrap();

    thread::sleep(Duration::from_millis(80));

    let err = service.upload_chunk(&chunk("slow", "b\n", 1, 2)).unwrap_err();
    assert!(matches!(err, VaultError::AssemblyFailed { failed_chunks } if failed_chunks == vec![0]));
}

#[test]
fn test_malformed_line_fails_and_sweeps() {
    let (kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("bad", "ok|1\n", 0, 2)).unwrap();

    let err = service.upload_chunk(&chunk("bad", "|orphan\n", 1, 2)).unwrap_err();

    assert!(matches!(err, VaultError::Invalid(msg) if msg.contains("line 2")));
    assert!(kv.keys("upload:*").unwrap().is_empty());
    assert!(service.list_all().unwrap().is_empty());
}

#[test]
fn test_unreadable_chunk_after_retries() {
    let (flaky, service) = setup_flaky_service(reads_chunk);
    service.upload_chunk(&chunk("flaky", "a\n", 0, 2)).unwrap();

    // Every attempt on chunk 0 fails; chunk 1 reads fine
    flaky.set_failures(3);
    let err = service.upload_chunk(&chunk("flaky", "b\n", 1, 2)).unwrap_err();

    assert!(matches!(err, VaultError::AssemblyFailed { failed_chunks } if failed_chunks == vec![0]));
    assert_eq!(flaky.matching_calls(), 4);
}

#[test]
fn test_transient_read_is_retried() {
    let (flaky, service) = setup_flaky_service(reads_chunk);
    service.upload_chunk(&chunk("retry", "a\n", 0, 2)).unwrap();

    flaky.set_failures(2);
    let receipt = service.upload_chunk(&chunk("retry", "b\n", 1, 2)).unwrap();

    assert_eq!(receipt.total, Some(2));
}

#[test]
fn test_chunk_store_retries_then_gives_up() {
    let (flaky, service) = setup_flaky_service(writes_chunk);

    flaky.set_failures(2);
    service.upload_chunk(&chunk("w", "a\n", 0, 2)).unwrap();

    flaky.set_failures(3);
    let err = service.upload_chunk(&chunk("w", "b\n", 1, 2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientStore);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_invalid_chunk_requests() {
    let (_kv, service) = setup_memory_service();

    let cases = [
        chunk("", "a", 0, 1),
        chunk("name", "a", 0, 0),
        chunk("name", "a", 3, 3),
        chunk("bad\nname", "a", 0, 1),
    ];
    for upload in &cases {
        let err = service.upload_chunk(upload).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid, "{:?}", upload);
    }
}

#[test]
fn test_oversized_chunk_rejected() {
    let config = Config::builder()
        .retry_delay(Duration::from_millis(1))
        .max_chunk_bytes(10)
        .build();
    let (kv, service) = setup_memory_service_with(config);

    let err = service
        .upload_chunk(&chunk("big", "0123456789X", 0, 2))
        .unwrap_err();

    assert!(matches!(err, VaultError::PayloadTooLarge { size: 11, limit: 10 }));
    assert!(kv.is_empty());
}
