//! Error types for ListVault
//!
//! Provides a unified error type for all operations, plus the coarse
//! [`ErrorKind`] taxonomy that callers (and the HTTP layer) dispatch on.

use thiserror::Error;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for ListVault operations
#[derive(Debug, Error)]
pub enum VaultError {
    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Payload too large: {size} bytes (max {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Upload assembly failed: unreadable chunks {failed_chunks:?}")]
    AssemblyFailed { failed_chunks: Vec<u32> },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Invalid,
    PayloadTooLarge,
    TransientStore,
    Corrupt,
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name used in JSON error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Invalid => "invalid",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::TransientStore => "transient_store",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Internal => "internal",
        }
    }

    /// Inverse of [`ErrorKind::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "not_found" => ErrorKind::NotFound,
            "conflict" => ErrorKind::Conflict,
            "invalid" => ErrorKind::Invalid,
            "payload_too_large" => ErrorKind::PayloadTooLarge,
            "transient_store" => ErrorKind::TransientStore,
            "corrupt" => ErrorKind::Corrupt,
            "internal" => ErrorKind::Internal,
            _ => return None,
        };
        Some(kind)
    }
}

impl VaultError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::Conflict(_) => ErrorKind::Conflict,
            VaultError::Invalid(_) => ErrorKind::Invalid,
            VaultError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            VaultError::Corrupt(_) | VaultError::AssemblyFailed { .. } => ErrorKind::Corrupt,
            VaultError::TransientStore(_) | VaultError::Io(_) => ErrorKind::TransientStore,
            VaultError::WalCorruption(_)
            | VaultError::Serialization(_)
            | VaultError::Protocol(_)
            | VaultError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry of the same operation may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientStore
    }
}

impl From<bincode::Error> for VaultError {
    fn from(e: bincode::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
