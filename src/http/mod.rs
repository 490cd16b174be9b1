//! HTTP Module
//!
//! The list API. Routing is a plain synchronous function over
//! [`HttpRequest`] → [`HttpResponse`], so every route can be exercised without
//! a socket; the axum adapter only moves bytes in and out and runs the router
//! on the blocking pool.
//!
//! ## Routes
//! ```text
//!   GET    /health
//!   GET    /lists
//!   POST   /lists
//!   POST   /lists/chunk-upload
//!   GET    /lists/{id}?page=&pageSize=
//!   PATCH  /lists/{id}
//!   DELETE /lists/{id}
//!   POST   /lists/{id}/append
//!   GET    /lists/{id}/download?includeEmail=
//! ```
//! `{id}` is a list id or a list name (percent-encoded).

mod routes;
mod transport_axum;

pub use transport_axum::{body_limit, router, serve};
pub use routes::handle_request;

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{ErrorKind, VaultError};

/// A request as seen by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Path plus optional query string
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, target: &str) -> Self {
        Self {
            method: method.to_string(),
            target: target.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// A response produced by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

impl HttpResponse {
    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status: 200,
                content_type: "application/json",
                body,
            },
            Err(e) => Self::from_error(&VaultError::from(e)),
        }
    }

    pub fn ok_plain(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; charset=utf-8",
            body,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::from_error(&VaultError::Invalid(message.to_string()))
    }

    pub fn not_found(message: &str) -> Self {
        Self::from_error(&VaultError::NotFound(message.to_string()))
    }

    pub fn method_not_allowed() -> Self {
        Self::error_with_status(405, "method not allowed", ErrorKind::Invalid)
    }

    /// Map an engine error to its status code and `{error, kind}` body
    pub fn from_error(err: &VaultError) -> Self {
        let kind = err.kind();
        Self::error_with_status(status_for(kind), &err.to_string(), kind)
    }

    fn error_with_status(status: u16, message: &str, kind: ErrorKind) -> Self {
        let body = serde_json::to_string(&ErrorBody {
            error: message.to_string(),
            kind: kind.as_str(),
        })
        .unwrap_or_else(|_| "{\"error\":\"internal error\",\"kind\":\"internal\"}".to_string());

        Self {
            status,
            content_type: "application/json",
            body,
        }
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::NotFound => 404,
        ErrorKind::Conflict => 409,
        ErrorKind::Invalid => 400,
        ErrorKind::PayloadTooLarge => 413,
        ErrorKind::TransientStore => 503,
        ErrorKind::Corrupt | ErrorKind::Internal => 500,
    }
}
