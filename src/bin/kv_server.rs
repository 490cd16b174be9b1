//! ListVault Key-Value Server Binary
//!
//! Exposes a WAL-backed key-value store over TCP for `listvault-server
//! --kv-addr` and `listvault-cli --kv-addr`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use listvault::config::WalSyncStrategy;
use listvault::janitor::Janitor;
use listvault::network::Server;
use listvault::{Config, DurableKv, KvStore};
use tracing_subscriber::{fmt, EnvFilter};

/// ListVault Key-Value Server
#[derive(Parser, Debug)]
#[command(name = "listvault-kv")]
#[command(about = "WAL-backed key-value store for ListVault")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./listvault_kv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// fsync the WAL every N entries (0 = after every write)
    #[arg(long, default_value = "100")]
    sync_every: usize,

    /// Expired-key purge interval, in seconds
    #[arg(long, default_value = "60")]
    janitor_secs: u64,

    /// Rewrite the WAL from live keys before serving
    #[arg(long)]
    compact: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,listvault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ListVault KV Server v{}", listvault::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = match args.sync_every {
        0 => WalSyncStrategy::EveryWrite,
        count => WalSyncStrategy::EveryNEntries { count },
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .kv_listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .wal_sync_strategy(sync_strategy)
        .janitor_interval(Duration::from_secs(args.janitor_secs))
        .build();

    // Open store
    let kv = match DurableKv::open(&config) {
        Ok(kv) => Arc::new(kv),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(keys = kv.entry_count(), "Store initialized successfully");

    if args.compact {
        if let Err(e) = kv.compact() {
            tracing::error!("WAL compaction failed: {}", e);
            std::process::exit(1);
        }
    }

    let store: Arc<dyn KvStore> = kv.clone();

    let janitor = match Janitor::spawn(Arc::clone(&store), config.janitor_interval) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!("Failed to start janitor: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, store) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C handler
    let shutdown_flag = server.shutdown_handle();
    ctrlc_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        shutdown_flag.store(true, Ordering::Relaxed);
    });

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    janitor.stop();
    if let Err(e) = kv.sync() {
        tracing::error!("Failed to sync WAL: {}", e);
    }

    tracing::info!("Server stopped");
}

/// Run `handler` once the process receives Ctrl+C
fn ctrlc_handler<F: FnOnce() + Send + 'static>(handler: F) {
    let spawned = std::thread::Builder::new()
        .name("ctrlc".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!("Ctrl+C handling unavailable: {}", e);
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                handler();
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Ctrl+C handling unavailable: {}", e);
    }
}
