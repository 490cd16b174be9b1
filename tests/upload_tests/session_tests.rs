//! Tests for upload sessions competing over names
//!
//! These tests verify:
//! - A name that already exists rejects new chunks
//! - A repeated final chunk after completion is a Conflict
//! - Concurrent sessions on one name produce exactly one list
//! - Sessions whose names share a prefix do not interfere

use std::sync::{Arc, Barrier};
use std::thread;

use listvault::kv::KvStore;
use listvault::{ErrorKind, ListKind};

use crate::common::{chunk, sample_lines, setup_memory_service, upload_in_chunks};

#[test]
fn test_repeated_final_chunk_conflicts() {
    let (_kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("once", "a\n", 0, 2)).unwrap();
    let done = service.upload_chunk(&chunk("once", "b\n", 1, 2)).unwrap();
    assert!(done.is_complete);

    let err = service.upload_chunk(&chunk("once", "b\n", 1, 2)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(service.list_all().unwrap().len(), 1);
    assert_eq!(service.resolve("once").unwrap().total, 2);
}

#[test]
fn test_chunk_for_existing_name_conflicts() {
    let (_kv, service) = setup_memory_service();
    service
        .create_list("taken", ListKind::Accounts, Vec::new())
        .unwrap();

    let err = service.upload_chunk(&chunk("taken", "a\n", 0, 3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_interleaved_sessions_one_winner() {
    let (_kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("dup", "a\n", 0, 2)).unwrap();
    service.upload_chunk(&chunk("dup", "a\n", 0, 2)).unwrap();

    let first = service.upload_chunk(&chunk("dup", "b\n", 1, 2));
    let second = service.upload_chunk(&chunk("dup", "b\n", 1, 2));

    assert!(first.unwrap().is_complete);
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);
}

#[test]
fn test_concurrent_sessions_one_winner() {
    let (_kv, service) = setup_memory_service();
    let service = Arc::new(service);
    let text = sample_lines(600);
    let sessions = 6;
    let barrier = Arc::new(Barrier::new(sessions));

    let handles: Vec<_> = (0..sessions)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let text = text.clone();
            thread::spawn(move || {
                barrier.wait();
                upload_in_chunks(&service, "race", &text, 3).map(|receipts| receipts[2].clone())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let losers: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(winners.len(), 1);
    assert!(winners[0].is_complete);
    assert_eq!(winners[0].total, Some(600));
    for err in losers {
        assert_eq!(err.kind(), ErrorKind::Conflict, "{}", err);
    }

    let lists = service.list_all().unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(service.download("race", true).unwrap(), text);
}

#[test]
fn test_prefix_names_do_not_interfere() {
    let (kv, service) = setup_memory_service();
    service.upload_chunk(&chunk("a", "from-a\n", 0, 2)).unwrap();
    service.upload_chunk(&chunk("a:1", "x\n", 0, 2)).unwrap();
    service.upload_chunk(&chunk("a*", "y\n", 0, 2)).unwrap();

    // Completing "a:1" sweeps only its own chunks
    service.upload_chunk(&chunk("a:1", "x2\n", 1, 2)).unwrap();
    service.upload_chunk(&chunk("a*", "y2\n", 1, 2)).unwrap();
    assert_eq!(kv.keys("upload:*").unwrap().len(), 1);

    service.upload_chunk(&chunk("a", "more\n", 1, 2)).unwrap();
    assert_eq!(service.download("a", true).unwrap(), "from-a\nmore\n");
    assert_eq!(service.download("a:1", true).unwrap(), "x\nx2\n");
}
