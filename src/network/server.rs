//! TCP Server
//!
//! Accepts connections and dispatches each to its own worker thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ErrorKind as FailureKind, Result};
use crate::kv::KvStore;
use crate::protocol::{write_response, Response};

use super::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// TCP server exposing a key-value store
pub struct Server {
    config: Config,
    store: Arc<dyn KvStore>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listener on `config.kv_listen_addr`
    pub fn bind(config: Config, store: Arc<dyn KvStore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.kv_listen_addr)?;
        // Non-blocking so the loop can observe the shutdown flag
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            store,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops `run` when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        tracing::info!("Key-value server listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Key-value server stopped accepting connections");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        // Accepted sockets inherit non-blocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Dropping {}: {}", addr, e);
            return;
        }

        if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
            tracing::warn!("Rejecting {}: connection limit reached", addr);
            let mut stream = stream;
            let busy = Response::failure(FailureKind::TransientStore, "too many connections");
            let _ = write_response(&mut stream, &busy);
            return;
        }

        let mut connection = match Connection::new(stream, Arc::clone(&self.store)) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) =
            connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)
        {
            tracing::warn!("Failed to set timeouts for {}: {}", addr, e);
        }

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(format!("kv-conn-{}", addr))
            .spawn({
                let active = Arc::clone(&active);
                move || {
                    if let Err(e) = connection.handle() {
                        tracing::debug!("Connection {} ended with error: {}", connection.peer_addr(), e);
                    }
                    active.fetch_sub(1, Ordering::Relaxed);
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn worker for {}: {}", addr, e);
            active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
