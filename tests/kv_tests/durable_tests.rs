//! Tests for the WAL-backed backend
//!
//! These tests verify:
//! - State survives reopen
//! - Read-only pipelines do not grow the log
//! - Expiry is preserved across restarts
//! - Compaction keeps live keys only
//! - A torn tail is dropped on reopen

use std::fs::OpenOptions;
use std::io::Write;
use std::thread;
use std::time::Duration;

use listvault::kv::{KvStore, Pipeline};
use listvault::DurableKv;

use crate::common::setup_temp_dir;

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_reopen_replays_state() {
    let temp = setup_temp_dir();
    {
        let kv = DurableKv::open_path(temp.path()).unwrap();
        kv.set("a", "1").unwrap();
        kv.hset("h", vec![("f".to_string(), "v".to_string())]).unwrap();
        kv.set("gone", "x").unwrap();
        kv.del(vec!["gone".to_string()]).unwrap();
        kv.close().unwrap();
    }

    let kv = DurableKv::open_path(temp.path()).unwrap();
    assert_eq!(kv.get("a").unwrap(), Some("1".to_string()));
    assert_eq!(kv.hgetall("h").unwrap().unwrap()["f"], "v");
    assert!(!kv.exists("gone").unwrap());
    assert_eq!(kv.current_lsn(), 4);
    assert_eq!(kv.data_dir(), temp.path());
}

#[test]
fn test_one_log_entry_per_pipeline() {
    let temp = setup_temp_dir();
    let kv = DurableKv::open_path(temp.path()).unwrap();

    let mut p = Pipeline::new();
    for i in 0..50 {
        p.set(format!("k{}", i), "v");
    }
    kv.execute(&p).unwrap();

    assert_eq!(kv.current_lsn(), 1);
    assert_eq!(kv.entry_count(), 50);
}

#[test]
fn test_reads_do_not_touch_log() {
    let temp = setup_temp_dir();
    let kv = DurableKv::open_path(temp.path()).unwrap();
    kv.set("a", "1").unwrap();

    kv.get("a").unwrap();
    kv.keys("*").unwrap();
    assert!(!kv.set_nx("a", "2").unwrap());
    kv.del(vec!["missing".to_string()]).unwrap();

    assert_eq!(kv.current_lsn(), 1);
}

#[test]
fn test_expiry_survives_reopen() {
    let temp = setup_temp_dir();
    {
        let kv = DurableKv::open_path(temp.path()).unwrap();
        kv.set_ex("short", "v", Duration::from_millis(20)).unwrap();
        kv.set_ex("long", "v", Duration::from_secs(3600)).unwrap();
        kv.sync().unwrap();
    }
    thread::sleep(Duration::from_millis(60));

    let kv = DurableKv::open_path(temp.path()).unwrap();
    assert!(!kv.exists("short").unwrap());
    assert!(kv.exists("long").unwrap());
    assert_eq!(kv.purge_expired().unwrap(), 1);
}

// =============================================================================
// Compaction
// =============================================================================

#[test]
fn test_compact_shrinks_log_and_keeps_state() {
    let temp = setup_temp_dir();
    let kv = DurableKv::open_path(temp.path()).unwrap();
    for i in 0..300 {
        kv.set("counter", &i.to_string()).unwrap();
    }
    kv.set("other", "x").unwrap();
    let before = std::fs::metadata(kv.wal_path()).unwrap().len();

    kv.compact().unwrap();

    let after = std::fs::metadata(kv.wal_path()).unwrap().len();
    assert!(after < before);
    assert_eq!(kv.current_lsn(), 1);

    kv.set("post", "y").unwrap();
    kv.close().unwrap();

    let kv = DurableKv::open_path(temp.path()).unwrap();
    assert_eq!(kv.get("counter").unwrap(), Some("299".to_string()));
    assert_eq!(kv.get("other").unwrap(), Some("x".to_string()));
    assert_eq!(kv.get("post").unwrap(), Some("y".to_string()));
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_torn_tail_dropped_on_reopen() {
    let temp = setup_temp_dir();
    let wal_path = {
        let kv = DurableKv::open_path(temp.path()).unwrap();
        kv.set("a", "1").unwrap();
        kv.set("b", "2").unwrap();
        let path = kv.wal_path();
        kv.close().unwrap();
        path
    };

    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0x03, 0, 0, 0, 0, 0, 0]).unwrap();
    drop(file);

    let kv = DurableKv::open_path(temp.path()).unwrap();
    assert_eq!(kv.get("b").unwrap(), Some("2".to_string()));
    assert_eq!(kv.current_lsn(), 2);

    kv.set("c", "3").unwrap();
    kv.close().unwrap();
    let kv = DurableKv::open_path(temp.path()).unwrap();
    assert_eq!(kv.entry_count(), 3);
}
