//! Response definitions
//!
//! Represents responses to key-value clients.
//!
//! ERROR payloads produced by the server read `{kind}: {message}`, where
//! `kind` is an [`ErrorKind`] name, so clients can tell retryable failures
//! from permanent ones.

use crate::error::{ErrorKind, VaultError};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x02,
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Payload (encoded replies for OK, error message for ERROR)
    pub payload: Vec<u8>,
}

impl Response {
    /// Create an OK response carrying an encoded payload
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: message.as_bytes().to_vec(),
        }
    }

    /// Create an ERROR response tagged with the failure's kind
    pub fn failure(kind: ErrorKind, message: &str) -> Self {
        Self::error(&format!("{}: {}", kind.as_str(), message))
    }

    /// ERROR response describing `err`
    pub fn from_error(err: &VaultError) -> Self {
        Self::failure(err.kind(), &err.to_string())
    }

    /// Kind tag and message of an ERROR response; untagged payloads have no kind
    pub fn failure_kind(&self) -> (Option<ErrorKind>, String) {
        let message = self.message();
        let tagged = message
            .split_once(": ")
            .and_then(|(tag, rest)| ErrorKind::parse(tag).map(|kind| (kind, rest.to_string())));
        match tagged {
            Some((kind, rest)) => (Some(kind), rest),
            None => (None, message),
        }
    }

    /// Error text of an ERROR response
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
