//! Tests for concurrent mutations
//!
//! These tests verify:
//! - Concurrent appends to one list produce contiguous indices
//! - Concurrent creates with one name produce one list
//! - Appends to different lists proceed independently
//! - Rename racing delete leaves no stray names or entries

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use listvault::kv::KvStore;
use listvault::pagination::PageRequest;
use listvault::{ErrorKind, ListKind, Record};

use crate::common::setup_memory_service;

#[test]
fn test_concurrent_appends_are_contiguous() {
    let (_kv, service) = setup_memory_service();
    let service = Arc::new(service);
    let entry = service.create_list("shared", ListKind::Accounts, Vec::new()).unwrap();

    let threads = 8;
    let rounds = 25;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for r in 0..rounds {
                    let batch = (0..3)
                        .map(|i| Record::new(format!("t{}-r{}-{}", t, r, i), None))
                        .collect();
                    service.append("shared", batch).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (threads * rounds * 3) as u64;
    let (resolved, page) = service
        .get_page(entry.id.as_str(), PageRequest::new(1, expected))
        .unwrap();

    assert_eq!(resolved.total, expected);
    assert_eq!(service.resolve("shared").unwrap().total, expected);
    let indices: Vec<u64> = page.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..expected).collect::<Vec<u64>>());

    let unique: HashSet<&str> = page.records.iter().map(|r| r.record.primary.as_str()).collect();
    assert_eq!(unique.len() as u64, expected);

    // Each batch stays in one piece
    for chunk in page.records.chunks(3) {
        let prefix = format!("{}-", chunk[0].record.primary.rsplit_once('-').unwrap().0);
        assert!(chunk.iter().all(|r| r.record.primary.starts_with(&prefix)));
    }
}

#[test]
fn test_concurrent_creates_one_winner() {
    let (_kv, service) = setup_memory_service();
    let service = Arc::new(service);
    let barrier = Arc::new(Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.create_list(
                    "contested",
                    ListKind::Accounts,
                    vec![Record::new(format!("from-{}", i), None)],
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(wins, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
    assert_eq!(service.list_all().unwrap().len(), 1);
}

#[test]
fn test_appends_to_different_lists() {
    let (_kv, service) = setup_memory_service();
    let service = Arc::new(service);
    for i in 0..4 {
        service
            .create_list(&format!("list-{}", i), ListKind::Accounts, Vec::new())
            .unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let name = format!("list-{}", i);
                for _ in 0..20 {
                    service.append(&name, vec![Record::new("x", None)]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for entry in service.list_all().unwrap() {
        assert_eq!(entry.total, 20);
    }
}

#[test]
fn test_delete_racing_appends_leaves_no_records() {
    let (kv, service) = setup_memory_service();
    let service = Arc::new(service);
    service.create_list("racy", ListKind::Accounts, Vec::new()).unwrap();

    let appender = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for _ in 0..200 {
                match service.append("racy", vec![Record::new("x", None)]) {
                    Ok(_) => {}
                    Err(e) => {
                        assert_eq!(e.kind(), ErrorKind::NotFound);
                        break;
                    }
                }
            }
        })
    };
    thread::sleep(std::time::Duration::from_millis(2));
    assert!(service.delete("racy").unwrap());
    appender.join().unwrap();

    assert!(kv.keys("list:*").unwrap().is_empty());
}

#[test]
fn test_rename_racing_delete_leaves_no_residue() {
    let (kv, service) = setup_memory_service();
    let service = Arc::new(service);

    for round in 0..50 {
        let old = format!("old-{}", round);
        let new = format!("new-{}", round);
        service
            .create_list(&old, ListKind::Accounts, vec![Record::new("a", None)])
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let renamer = {
            let (service, barrier) = (Arc::clone(&service), Arc::clone(&barrier));
            let (old, new) = (old.clone(), new.clone());
            thread::spawn(move || {
                barrier.wait();
                service.rename(&old, &new).map(|_| ())
            })
        };
        let deleter = {
            let (service, barrier) = (Arc::clone(&service), Arc::clone(&barrier));
            let old = old.clone();
            thread::spawn(move || {
                barrier.wait();
                service.delete(&old)
            })
        };

        if let Err(e) = renamer.join().unwrap() {
            assert_eq!(e.kind(), ErrorKind::NotFound);
        }
        deleter.join().unwrap().unwrap();

        // Whatever the interleaving, both names resolve cleanly or not at all
        service.delete(&new).unwrap();
        service.delete(&old).unwrap();
        assert!(kv.is_empty(), "residue after round {}", round);
    }
}
