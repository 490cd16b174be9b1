//! ListVault API Server Binary
//!
//! Serves the list HTTP API, backed either by an embedded WAL-backed store or
//! by a remote `listvault-kv` instance.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use listvault::config::WalSyncStrategy;
use listvault::janitor::Janitor;
use listvault::{Config, DurableKv, KvStore, ListService, RemoteKv};
use tracing_subscriber::{fmt, EnvFilter};

/// ListVault API Server
#[derive(Parser, Debug)]
#[command(name = "listvault-server")]
#[command(about = "Chunked list ingestion and paginated record storage")]
#[command(version)]
struct Args {
    /// Data directory of the embedded store (ignored with --kv-addr)
    #[arg(short, long, default_value = "./listvault_data")]
    data_dir: String,

    /// Use a remote listvault-kv server instead of the embedded store
    #[arg(short, long)]
    kv_addr: Option<String>,

    /// HTTP listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// fsync the WAL every N entries (0 = after every write)
    #[arg(long, default_value = "100")]
    sync_every: usize,

    /// Lifetime of buffered upload chunks, in seconds
    #[arg(long, default_value = "3600")]
    chunk_ttl_secs: u64,

    /// Largest accepted chunk, in MB
    #[arg(long, default_value = "50")]
    max_chunk_mb: usize,

    /// Attempts per store operation on transient failures
    #[arg(long, default_value = "3")]
    retry_attempts: u32,

    /// Delay between attempts, in milliseconds
    #[arg(long, default_value = "1000")]
    retry_delay_ms: u64,

    /// Expired-key purge interval, in seconds
    #[arg(long, default_value = "60")]
    janitor_secs: u64,

    /// Tokio worker threads
    #[arg(long, default_value = "4")]
    workers: usize,
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

    tracing::info!("ListVault Server v{}", listvault::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = match args.sync_every {
        0 => WalSyncStrategy::EveryWrite,
        count => WalSyncStrategy::EveryNEntries { count },
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .wal_sync_strategy(sync_strategy)
        .http_listen_addr(&args.listen)
        .chunk_ttl(Duration::from_secs(args.chunk_ttl_secs))
        .max_chunk_bytes(args.max_chunk_mb * 1024 * 1024)
        .retry_attempts(args.retry_attempts)
        .retry_delay(Duration::from_millis(args.retry_delay_ms))
        .janitor_interval(Duration::from_secs(args.janitor_secs))
        .build();

    // Open the backing store
    let mut durable: Option<Arc<DurableKv>> = None;
    let store: Arc<dyn KvStore> = match &args.kv_addr {
        Some(addr) => {
            tracing::info!("Using remote key-value store at {}", addr);
            let timeout = Duration::from_millis(config.read_timeout_ms);
            match RemoteKv::connect(addr.as_str(), timeout) {
                Ok(kv) => Arc::new(kv),
                Err(e) => {
                    tracing::error!("Failed to connect to {}: {}", addr, e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            tracing::info!("Data directory: {}", args.data_dir);
            match DurableKv::open(&config) {
                Ok(kv) => {
                    let kv = Arc::new(kv);
                    let store: Arc<dyn KvStore> = kv.clone();
                    durable = Some(kv);
                    store
                }
                Err(e) => {
                    tracing::error!("Failed to open store: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let service = match ListService::new(Arc::clone(&store), config.clone()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let janitor = match Janitor::spawn(Arc::clone(&store), config.janitor_interval) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!("Failed to start janitor: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.workers.max(1))
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&config.http_listen_addr)
            .await
            .map_err(listvault::VaultError::Io)?;
        listvault::http::serve(service, listener, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
        })
        .await
    });

    janitor.stop();

    if let Some(kv) = durable {
        if let Err(e) = kv.sync() {
            tracing::error!("Failed to sync WAL: {}", e);
        }
    }

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
