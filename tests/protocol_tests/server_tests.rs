//! Key-value server tests
//!
//! These tests verify:
//! - RemoteKv round trips against a live server
//! - Pipelines keep their atomicity over the wire
//! - Connection limits and unreachable servers
//! - Server failures keep their kind; only transient ones stay retryable
//! - A request is re-sent only when the server had dropped the connection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use listvault::kv::{KvReply, KvStore, MemoryKv, Pipeline};
use listvault::network::Server;
use listvault::{Config, ErrorKind, RemoteKv, Result, VaultError};

// =============================================================================
// Helper Functions
// =============================================================================

struct RunningServer {
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
    addr: String,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.server.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

fn start_server(max_connections: usize) -> (Arc<MemoryKv>, RunningServer) {
    let config = Config::builder()
        .kv_listen_addr("127.0.0.1:0")
        .max_connections(max_connections)
        .build();
    let kv = Arc::new(MemoryKv::new());
    let store: Arc<dyn KvStore> = kv.clone();
    (kv, start_server_with(store, config))
}

fn start_server_with(store: Arc<dyn KvStore>, config: Config) -> RunningServer {
    let server = Arc::new(Server::bind(config, store).unwrap());
    let addr = server.local_addr().unwrap().to_string();

    let handle = thread::spawn({
        let server = Arc::clone(&server);
        move || server.run().unwrap()
    });

    RunningServer {
        server,
        handle: Some(handle),
        addr,
    }
}

fn loopback_config() -> Config {
    Config::builder().kv_listen_addr("127.0.0.1:0").build()
}

/// Fails every pipeline with the error `make` builds
struct FailingKv {
    make: fn() -> VaultError,
}

impl KvStore for FailingKv {
    fn execute(&self, _pipeline: &Pipeline) -> Result<Vec<KvReply>> {
        Err((self.make)())
    }
}

/// Executes pipelines only after `delay`, counting them
struct SlowKv {
    inner: MemoryKv,
    delay: Duration,
    calls: AtomicUsize,
}

impl KvStore for SlowKv {
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<KvReply>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.execute(pipeline)
    }
}

fn connect(addr: &str) -> RemoteKv {
    RemoteKv::connect(addr, Duration::from_secs(2)).unwrap()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_remote_ping() {
    let (_kv, running) = start_server(16);
    let remote = connect(&running.addr);
    remote.ping().unwrap();
    assert_eq!(remote.addr(), running.addr);
}

#[test]
fn test_remote_commands_reach_backing_store() {
    let (kv, running) = start_server(16);
    let remote = connect(&running.addr);

    remote.set("greeting", "hello").unwrap();
    assert!(remote.set_nx("lock", "a").unwrap());
    assert!(!remote.set_nx("lock", "b").unwrap());
    remote
        .hset("h", vec![("f".to_string(), "v".to_string())])
        .unwrap();

    assert_eq!(kv.get("greeting").unwrap(), Some("hello".to_string()));
    assert_eq!(remote.get("lock").unwrap(), Some("a".to_string()));
    assert_eq!(remote.hgetall("h").unwrap().unwrap()["f"], "v");
    assert_eq!(remote.keys("*").unwrap().len(), 3);
    assert_eq!(remote.del(vec!["greeting".to_string(), "missing".to_string()]).unwrap(), 1);
    assert!(!remote.exists("greeting").unwrap());
}

#[test]
fn test_remote_pipeline_replies_in_order() {
    let (_kv, running) = start_server(16);
    let remote = connect(&running.addr);

    let mut p = Pipeline::new();
    p.set("s", "1").get("s").hgetall("s").exists("nope");
    let replies = remote.execute(&p).unwrap();

    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0], KvReply::Ok);
    assert_eq!(replies[1], KvReply::Str("1".to_string()));
    assert!(matches!(replies[2], KvReply::Error(_)));
    assert_eq!(replies[3], KvReply::Bool(false));
}

#[test]
fn test_remote_concurrent_clients() {
    let (kv, running) = start_server(64);
    let remote = Arc::new(connect(&running.addr));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let remote = Arc::clone(&remote);
            thread::spawn(move || {
                for i in 0..25 {
                    remote.set(&format!("t{}:{}", t, i), "v").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(kv.entry_count(), 200);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_connect_to_closed_port_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = RemoteKv::connect(addr, Duration::from_millis(200)).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::TransientStore);
}

#[test]
fn test_server_stops_on_shutdown() {
    let (_kv, running) = start_server(4);
    let addr = running.addr.clone();
    drop(running);

    assert!(RemoteKv::connect(addr, Duration::from_millis(200)).is_err());
}

#[test]
fn test_server_failures_keep_their_kind() {
    let broken = start_server_with(
        Arc::new(FailingKv {
            make: || VaultError::WalCorruption("torn entry".into()),
        }),
        loopback_config(),
    );
    let err = connect(&broken.addr).set("k", "v").unwrap_err();
    assert!(matches!(err, VaultError::Protocol(_)));
    assert!(err.to_string().contains("torn entry"));
    assert!(!err.is_transient());

    let busy = start_server_with(
        Arc::new(FailingKv {
            make: || VaultError::TransientStore("disk busy".into()),
        }),
        loopback_config(),
    );
    let err = connect(&busy.addr).set("k", "v").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientStore);
}

#[test]
fn test_slow_reply_is_not_resent() {
    let store = Arc::new(SlowKv {
        inner: MemoryKv::new(),
        delay: Duration::from_millis(600),
        calls: AtomicUsize::new(0),
    });
    let running = start_server_with(store.clone(), loopback_config());
    let remote = RemoteKv::connect(running.addr.as_str(), Duration::from_millis(150)).unwrap();

    let err = remote.set_nx("name", "first").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientStore);

    thread::sleep(Duration::from_millis(900));
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.inner.get("name").unwrap(), Some("first".to_string()));
}

#[test]
fn test_idle_connection_dropped_by_server_is_replaced() {
    let config = Config::builder()
        .kv_listen_addr("127.0.0.1:0")
        .read_timeout_ms(100)
        .build();
    let kv = Arc::new(MemoryKv::new());
    let running = start_server_with(kv.clone(), config);
    let remote = connect(&running.addr);

    // The server closes the pooled connection once its read timeout passes
    thread::sleep(Duration::from_millis(400));

    remote.set("after-idle", "v").unwrap();
    assert_eq!(kv.get("after-idle").unwrap(), Some("v".to_string()));
}
