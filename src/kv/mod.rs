//! Key-Value Module
//!
//! The store the list engine is written against.
//!
//! ## Capabilities
//! - String values with optional TTL
//! - Field maps ("hashes")
//! - Set-if-absent (strings and hashes)
//! - Multi-command pipelines, applied atomically by every backend
//! - Key enumeration by glob pattern (`*` and `?`)
//!
//! ## Backends
//! ```text
//!   MemoryKv   ── RwLock<BTreeMap>, lazy TTL
//!   DurableKv  ── MemoryKv + WAL (one entry per pipeline)
//!   RemoteKv   ── TCP client for a `listvault-kv` server
//! ```

mod memory;
mod durable;
mod remote;

pub use memory::MemoryKv;
pub use durable::DurableKv;
pub use remote::RemoteKv;

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Field map stored under a hash key
pub type FieldMap = BTreeMap<String, String>;

// =============================================================================
// Stored Values
// =============================================================================

/// A value as held by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredValue {
    Str(String),
    Hash(FieldMap),
}

/// A value plus its absolute expiry (unix millis)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: StoredValue,
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

// =============================================================================
// Commands and Replies
// =============================================================================

/// A single key-value command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvCommand {
    /// Read a string value
    Get { key: String },

    /// Write a string value, replacing any previous value and TTL
    Set { key: String, value: String, ttl_ms: Option<u64> },

    /// Write a string value only if the key is absent
    SetNx { key: String, value: String },

    /// Merge fields into a hash (creating it if absent)
    HSet { key: String, fields: Vec<(String, String)> },

    /// Create a hash only if the key is absent
    HSetNx { key: String, fields: Vec<(String, String)> },

    /// Read every field of a hash
    HGetAll { key: String },

    /// Remove keys
    Del { keys: Vec<String> },

    /// Test for a live key
    Exists { key: String },

    /// Enumerate live keys matching a glob pattern
    Keys { pattern: String },
}

impl KvCommand {
    /// Whether executing this command can change state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            KvCommand::Set { .. }
                | KvCommand::SetNx { .. }
                | KvCommand::HSet { .. }
                | KvCommand::HSetNx { .. }
                | KvCommand::Del { .. }
        )
    }
}

/// The reply to a single command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvReply {
    Nil,
    Ok,
    Int(i64),
    Bool(bool),
    Str(String),
    Hash(FieldMap),
    Keys(Vec<String>),
    /// Per-command failure (e.g. wrong value type); siblings still apply
    Error(String),
}

impl KvReply {
    fn unexpected(&self, wanted: &str) -> VaultError {
        match self {
            KvReply::Error(msg) => VaultError::Corrupt(msg.clone()),
            other => VaultError::Protocol(format!("expected {} reply, got {:?}", wanted, other)),
        }
    }

    /// `Str` → Some, `Nil` → None
    pub fn into_string(self) -> Result<Option<String>> {
        match self {
            KvReply::Str(s) => Ok(Some(s)),
            KvReply::Nil => Ok(None),
            other => Err(other.unexpected("string")),
        }
    }

    /// `Hash` → Some, `Nil` → None
    pub fn into_hash(self) -> Result<Option<FieldMap>> {
        match self {
            KvReply::Hash(h) => Ok(Some(h)),
            KvReply::Nil => Ok(None),
            other => Err(other.unexpected("hash")),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            KvReply::Bool(b) => Ok(b),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn into_int(self) -> Result<i64> {
        match self {
            KvReply::Int(n) => Ok(n),
            other => Err(other.unexpected("int")),
        }
    }

    pub fn into_keys(self) -> Result<Vec<String>> {
        match self {
            KvReply::Keys(k) => Ok(k),
            other => Err(other.unexpected("keys")),
        }
    }

    pub fn into_ok(self) -> Result<()> {
        match self {
            KvReply::Ok => Ok(()),
            other => Err(other.unexpected("ok")),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered batch of commands executed in one round trip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    commands: Vec<KvCommand>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, command: KvCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(KvCommand::Get { key: key.into() })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(KvCommand::Set {
            key: key.into(),
            value: value.into(),
            ttl_ms: None,
        })
    }

    pub fn set_ex(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> &mut Self {
        self.push(KvCommand::Set {
            key: key.into(),
            value: value.into(),
            ttl_ms: Some(ttl.as_millis() as u64),
        })
    }

    pub fn set_nx(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(KvCommand::SetNx {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn hset(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.push(KvCommand::HSet {
            key: key.into(),
            fields,
        })
    }

    pub fn hset_nx(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.push(KvCommand::HSetNx {
            key: key.into(),
            fields,
        })
    }

    pub fn hgetall(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(KvCommand::HGetAll { key: key.into() })
    }

    pub fn del(&mut self, keys: Vec<String>) -> &mut Self {
        self.push(KvCommand::Del { keys })
    }

    pub fn exists(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(KvCommand::Exists { key: key.into() })
    }

    pub fn keys(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.push(KvCommand::Keys {
            pattern: pattern.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[KvCommand] {
        &self.commands
    }

    /// Whether any command can change state
    pub fn has_mutations(&self) -> bool {
        self.commands.iter().any(KvCommand::is_mutation)
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// A key-value store the engine can run against
///
/// `execute` is the only required operation; the single-command helpers are
/// one-element pipelines with typed replies.
pub trait KvStore: Send + Sync {
    /// Execute a pipeline, returning one reply per command in order
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<KvReply>>;

    /// Drop expired keys eagerly, returning how many were removed
    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut p = Pipeline::new();
        p.get(key);
        single(self.execute(&p)?)?.into_string()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut p = Pipeline::new();
        p.set(key, value);
        single(self.execute(&p)?)?.into_ok()
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut p = Pipeline::new();
        p.set_ex(key, value, ttl);
        single(self.execute(&p)?)?.into_ok()
    }

    fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut p = Pipeline::new();
        p.set_nx(key, value);
        single(self.execute(&p)?)?.into_bool()
    }

    fn hset(&self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        let mut p = Pipeline::new();
        p.hset(key, fields);
        single(self.execute(&p)?)?.into_ok()
    }

    fn hset_nx(&self, key: &str, fields: Vec<(String, String)>) -> Result<bool> {
        let mut p = Pipeline::new();
        p.hset_nx(key, fields);
        single(self.execute(&p)?)?.into_bool()
    }

    fn hgetall(&self, key: &str) -> Result<Option<FieldMap>> {
        let mut p = Pipeline::new();
        p.hgetall(key);
        single(self.execute(&p)?)?.into_hash()
    }

    fn del(&self, keys: Vec<String>) -> Result<i64> {
        let mut p = Pipeline::new();
        p.del(keys);
        single(self.execute(&p)?)?.into_int()
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let mut p = Pipeline::new();
        p.exists(key);
        single(self.execute(&p)?)?.into_bool()
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut p = Pipeline::new();
        p.keys(pattern);
        single(self.execute(&p)?)?.into_keys()
    }
}

/// Extract the only reply of a one-command pipeline
fn single(replies: Vec<KvReply>) -> Result<KvReply> {
    let count = replies.len();
    let mut iter = replies.into_iter();
    match (iter.next(), count) {
        (Some(reply), 1) => Ok(reply),
        _ => Err(VaultError::Protocol(format!(
            "expected exactly one reply, got {}",
            count
        ))),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Glob match supporting `*` (any run) and `?` (any single char)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Literal prefix of a glob pattern (everything before the first wildcard)
pub fn glob_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?']) {
        Some(pos) => &pattern[..pos],
        None => pattern,
    }
}
