//! Per-list mutual exclusion
//!
//! Appends read `total` and then write `total + n`; two unserialized appends to
//! the same list would assign the same indices. Every mutation of a list's
//! records runs while holding that list's lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::records::ListId;

/// Table of lazily created per-list locks
#[derive(Default)]
pub struct ListLocks {
    table: Mutex<HashMap<ListId, Arc<Mutex<()>>>>,
}

/// Held lock on one list; released on drop
pub type ListGuard = ArcMutexGuard<RawMutex, ()>;

impl ListLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `id` is held
    pub fn lock(&self, id: &ListId) -> ListGuard {
        let lock = {
            let mut table = self.table.lock();
            Arc::clone(table.entry(id.clone()).or_default())
        };

        lock.lock_arc()
    }

    /// Drop the entry for `id` once no one else holds or waits on it
    pub fn forget(&self, id: &ListId) {
        let mut table = self.table.lock();
        if let Some(lock) = table.get(id) {
            if Arc::strong_count(lock) == 1 {
                table.remove(id);
            }
        }
    }

    /// Number of lists with a lock entry
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}
