//! In-memory key-value backend
//!
//! BTreeMap-based store with RwLock for concurrency.
//!
//! Pipelines are evaluated in two steps: `plan` computes the replies and the
//! resulting [`Operation`]s against an overlay without touching the map, and
//! `apply` installs those operations. Holding the write lock across both steps
//! makes every pipeline atomic; `DurableKv` logs the planned operations to the
//! WAL in between.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::wal::Operation;

use super::{
    glob_match, glob_prefix, now_millis, FieldMap, KvCommand, KvReply, KvStore, Pipeline,
    StoredEntry, StoredValue,
};

const WRONG_TYPE: &str = "WRONGTYPE operation against a key holding the wrong kind of value";

/// In-memory key-value store
pub struct MemoryKv {
    data: RwLock<BTreeMap<String, StoredEntry>>,

    /// Approximate size of keys and values in bytes
    size: AtomicUsize,
}

impl MemoryKv {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Number of keys held (including expired keys not yet purged)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all live entries in key order
    pub fn live_entries(&self) -> Vec<(String, StoredEntry)> {
        let data = self.data.read();
        live(&data)
    }

    /// Run `f` on a snapshot while writers are held off
    pub(crate) fn with_snapshot<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Vec<(String, StoredEntry)>) -> Result<T>,
    {
        let data = self.data.read();
        f(live(&data))
    }

    /// Execute a pipeline, handing the planned operations to `log` before
    /// they are installed. If `log` fails nothing is applied.
    pub(crate) fn execute_logged<F>(&self, pipeline: &Pipeline, log: F) -> Result<Vec<KvReply>>
    where
        F: FnOnce(&[Operation]) -> Result<()>,
    {
        let now = now_millis();

        if !pipeline.has_mutations() {
            let data = self.data.read();
            let (replies, _) = plan(&data, pipeline.commands(), now);
            return Ok(replies);
        }

        let mut data = self.data.write();
        let (replies, operations) = plan(&data, pipeline.commands(), now);
        if !operations.is_empty() {
            log(&operations)?;
            self.apply_locked(&mut data, operations);
        }
        Ok(replies)
    }

    /// Install operations (WAL replay path)
    pub fn apply(&self, operations: Vec<Operation>) {
        let mut data = self.data.write();
        self.apply_locked(&mut data, operations);
    }

    fn apply_locked(&self, data: &mut BTreeMap<String, StoredEntry>, operations: Vec<Operation>) {
        for op in operations {
            match op {
                Operation::Put { key, entry } => {
                    let added = key.len() + value_size(&entry.value);
                    if let Some(old) = data.insert(key.clone(), entry) {
                        self.size
                            .fetch_sub(key.len() + value_size(&old.value), Ordering::Relaxed);
                    }
                    self.size.fetch_add(added, Ordering::Relaxed);
                }
                Operation::Delete { key } => {
                    if let Some(old) = data.remove(&key) {
                        self.size
                            .fetch_sub(key.len() + value_size(&old.value), Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Remove every expired key, returning the operations that did it
    pub(crate) fn purge_logged<F>(&self, log: F) -> Result<usize>
    where
        F: FnOnce(&[Operation]) -> Result<()>,
    {
        let now = now_millis();
        let mut data = self.data.write();
        let operations: Vec<Operation> = data
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| Operation::Delete { key: k.clone() })
            .collect();

        let count = operations.len();
        if count > 0 {
            log(&operations)?;
            self.apply_locked(&mut data, operations);
        }
        Ok(count)
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.data.write().clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKv {
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<KvReply>> {
        self.execute_logged(pipeline, |_| Ok(()))
    }

    fn purge_expired(&self) -> Result<usize> {
        self.purge_logged(|_| Ok(()))
    }
}

// =============================================================================
// Planning
// =============================================================================

/// View of the map with the pipeline's own earlier writes layered on top
struct Overlay<'a> {
    base: &'a BTreeMap<String, StoredEntry>,
    /// key → Some(entry) for a pending write, None for a pending delete
    pending: HashMap<String, Option<StoredEntry>>,
    now: u64,
}

impl<'a> Overlay<'a> {
    fn lookup(&self, key: &str) -> Option<&StoredEntry> {
        let entry = match self.pending.get(key) {
            Some(pending) => pending.as_ref(),
            None => self.base.get(key),
        };
        entry.filter(|e| !e.is_expired(self.now))
    }

    fn put(&mut self, ops: &mut Vec<Operation>, key: &str, entry: StoredEntry) {
        self.pending.insert(key.to_string(), Some(entry.clone()));
        ops.push(Operation::Put {
            key: key.to_string(),
            entry,
        });
    }

    fn delete(&mut self, ops: &mut Vec<Operation>, key: &str) {
        self.pending.insert(key.to_string(), None);
        ops.push(Operation::Delete {
            key: key.to_string(),
        });
    }

    fn matching_keys(&self, pattern: &str) -> Vec<String> {
        let prefix = glob_prefix(pattern);
        let mut keys: Vec<String> = self
            .base
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| !self.pending.contains_key(k.as_str()))
            .filter(|(k, e)| !e.is_expired(self.now) && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();

        keys.extend(
            self.pending
                .iter()
                .filter(|(k, e)| matches!(e, Some(e) if !e.is_expired(self.now)) && glob_match(pattern, k))
                .map(|(k, _)| k.clone()),
        );
        keys.sort();
        keys
    }
}

/// Evaluate commands against `base`, returning replies and the operations
/// needed to reach the resulting state
fn plan(
    base: &BTreeMap<String, StoredEntry>,
    commands: &[KvCommand],
    now: u64,
) -> (Vec<KvReply>, Vec<Operation>) {
    let mut view = Overlay {
        base,
        pending: HashMap::new(),
        now,
    };
    let mut ops = Vec::new();
    let mut replies = Vec::with_capacity(commands.len());

    for command in commands {
        let reply = match command {
            KvCommand::Get { key } => match view.lookup(key) {
                None => KvReply::Nil,
                Some(StoredEntry { value: StoredValue::Str(s), .. }) => KvReply::Str(s.clone()),
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },

            KvCommand::Set { key, value, ttl_ms } => {
                let entry = StoredEntry {
                    value: StoredValue::Str(value.clone()),
                    expires_at: ttl_ms.map(|ttl| now.saturating_add(ttl)),
                };
                view.put(&mut ops, key, entry);
                KvReply::Ok
            }

            KvCommand::SetNx { key, value } => {
                if view.lookup(key).is_some() {
                    KvReply::Bool(false)
                } else {
                    let entry = StoredEntry {
                        value: StoredValue::Str(value.clone()),
                        expires_at: None,
                    };
                    view.put(&mut ops, key, entry);
                    KvReply::Bool(true)
                }
            }

            KvCommand::HSet { key, fields } => match view.lookup(key) {
                Some(StoredEntry { value: StoredValue::Str(_), .. }) => {
                    KvReply::Error(WRONG_TYPE.to_string())
                }
                existing => {
                    let (mut map, expires_at) = match existing {
                        Some(StoredEntry {
                            value: StoredValue::Hash(h),
                            expires_at,
                        }) => (h.clone(), *expires_at),
                        _ => (FieldMap::new(), None),
                    };
                    for (field, value) in fields {
                        map.insert(field.clone(), value.clone());
                    }
                    let entry = StoredEntry {
                        value: StoredValue::Hash(map),
                        expires_at,
                    };
                    view.put(&mut ops, key, entry);
                    KvReply::Ok
                }
            },

            KvCommand::HSetNx { key, fields } => {
                if view.lookup(key).is_some() {
                    KvReply::Bool(false)
                } else {
                    let entry = StoredEntry {
                        value: StoredValue::Hash(fields.iter().cloned().collect()),
                        expires_at: None,
                    };
                    view.put(&mut ops, key, entry);
                    KvReply::Bool(true)
                }
            }

            KvCommand::HGetAll { key } => match view.lookup(key) {
                None => KvReply::Nil,
                Some(StoredEntry { value: StoredValue::Hash(h), .. }) => KvReply::Hash(h.clone()),
                Some(_) => KvReply::Error(WRONG_TYPE.to_string()),
            },

            KvCommand::Del { keys } => {
                let mut removed = 0i64;
                for key in keys {
                    if view.lookup(key).is_some() {
                        removed += 1;
                    }
                    // Expired-but-present keys are dropped too
                    if view.pending.get(key.as_str()).map_or(base.contains_key(key.as_str()), Option::is_some) {
                        view.delete(&mut ops, key);
                    }
                }
                KvReply::Int(removed)
            }

            KvCommand::Exists { key } => KvReply::Bool(view.lookup(key).is_some()),

            KvCommand::Keys { pattern } => KvReply::Keys(view.matching_keys(pattern)),
        };
        replies.push(reply);
    }

    (replies, ops)
}

fn live(data: &BTreeMap<String, StoredEntry>) -> Vec<(String, StoredEntry)> {
    let now = now_millis();
    data.iter()
        .filter(|(_, e)| !e.is_expired(now))
        .map(|(k, e)| (k.clone(), e.clone()))
        .collect()
}

fn value_size(value: &StoredValue) -> usize {
    match value {
        StoredValue::Str(s) => s.len(),
        StoredValue::Hash(h) => h.iter().map(|(k, v)| k.len() + v.len()).sum(),
    }
}
