//! Background janitor
//!
//! Periodically purges expired keys (abandoned upload chunks mostly) from the
//! backing store. TTL still guarantees expiry on read; this only reclaims the
//! memory and WAL space sooner.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use crate::error::Result;
use crate::kv::KvStore;

/// Handle to a running janitor thread; stops it on drop
pub struct Janitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Janitor {
    /// Spawn a thread purging `store` every `interval`
    pub fn spawn(store: Arc<dyn KvStore>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("listvault-janitor".to_string())
            .spawn(move || {
                tracing::debug!(?interval, "Janitor started");
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => match store.purge_expired() {
                            Ok(0) => {}
                            Ok(purged) => tracing::debug!(purged, "Purged expired keys"),
                            Err(e) => tracing::warn!(error = %e, "Expired key purge failed"),
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                tracing::debug!("Janitor stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Janitor thread panicked");
            }
        }
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
