//! Request routing
//!
//! Turns an [`HttpRequest`] into a service call and the result into an
//! [`HttpResponse`]. Blocking; callers on an async runtime must run it on a
//! blocking thread.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::pagination::{PageRequest, Pagination};
use crate::records::{parse_entries, ListId, ListKind};
use crate::service::ListService;
use crate::upload::ChunkUpload;

use super::{HttpRequest, HttpResponse};

// =============================================================================
// Bodies
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateListBody {
    name: String,
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(default)]
    kind: Option<ListKind>,
}

#[derive(Debug, Deserialize)]
struct AppendBody {
    accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkBody {
    name: String,
    chunk: String,
    chunk_index: u32,
    total_chunks: u32,
    #[serde(default)]
    kind: Option<ListKind>,
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedList<'a> {
    id: &'a ListId,
    name: &'a str,
    kind: ListKind,
    total: u64,
    created_at: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListPage<'a> {
    id: &'a ListId,
    name: &'a str,
    kind: ListKind,
    created_at: &'a str,
    total: u64,
    accounts: Vec<String>,
    pagination: Pagination,
}

#[derive(Serialize)]
struct Appended {
    success: bool,
    total: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkAccepted {
    success: bool,
    is_complete: bool,
    progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<ListId>,
}

#[derive(Serialize)]
struct Message {
    message: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

// =============================================================================
// Router
// =============================================================================

/// Route one request against the service
pub fn handle_request(service: &ListService, request: &HttpRequest) -> HttpResponse {
    let (path, query) = split_target(&request.target);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => Ok(HttpResponse::ok_json(&Health { status: "ok" })),
        ("GET", ["lists"]) => list_all(service),
        ("POST", ["lists"]) => create_list(service, request),
        ("POST", ["lists", "chunk-upload"]) => chunk_upload(service, request),
        ("GET", ["lists", id]) => get_page(service, id, &query),
        ("PATCH", ["lists", id]) => rename(service, id, request),
        ("DELETE", ["lists", id]) => delete(service, id),
        ("POST", ["lists", id, "append"]) => append(service, id, request),
        ("GET", ["lists", id, "download"]) => download(service, id, &query),
        (_, ["health"])
        | (_, ["lists"])
        | (_, ["lists", _])
        | (_, ["lists", _, "append"])
        | (_, ["lists", _, "download"]) => Ok(HttpResponse::method_not_allowed()),
        _ => Ok(HttpResponse::not_found(&format!("no route for {}", path))),
    };

    let response = result.unwrap_or_else(|e| HttpResponse::from_error(&e));
    tracing::debug!(
        method = %request.method,
        path = %path,
        status = response.status,
        "Handled request"
    );
    response
}

fn list_all(service: &ListService) -> Result<HttpResponse> {
    Ok(HttpResponse::ok_json(&service.list_all()?))
}

fn create_list(service: &ListService, request: &HttpRequest) -> Result<HttpResponse> {
    let body: CreateListBody = parse_body(request)?;
    let records = parse_entries(&body.accounts)?;
    let entry = service.create_list(&body.name, body.kind.unwrap_or_default(), records)?;

    Ok(HttpResponse::ok_json(&CreatedList {
        id: &entry.id,
        name: &entry.name,
        kind: entry.kind,
        total: entry.total,
        created_at: &entry.created_at,
    }))
}

fn chunk_upload(service: &ListService, request: &HttpRequest) -> Result<HttpResponse> {
    let body: ChunkBody = parse_body(request)?;
    let receipt = service.upload_chunk(&ChunkUpload {
        name: body.name,
        chunk: body.chunk,
        chunk_index: body.chunk_index,
        total_chunks: body.total_chunks,
        kind: body.kind.unwrap_or_default(),
    })?;

    Ok(HttpResponse::ok_json(&ChunkAccepted {
        success: true,
        is_complete: receipt.is_complete,
        progress: receipt.progress,
        total: receipt.total,
        id: receipt.id,
    }))
}

fn get_page(
    service: &ListService,
    id: &str,
    query: &HashMap<String, String>,
) -> Result<HttpResponse> {
    let id = decode_segment(id)?;
    let request = PageRequest {
        page: parse_query_u64(query, "page")?,
        page_size: parse_query_u64(query, "pageSize")?,
    };
    let (entry, page) = service.get_page(&id, request)?;

    Ok(HttpResponse::ok_json(&ListPage {
        id: &entry.id,
        name: &entry.name,
        kind: entry.kind,
        created_at: &entry.created_at,
        total: page.total,
        accounts: page
            .records
            .iter()
            .map(|stored| stored.record.to_line(true))
            .collect(),
        pagination: page.pagination,
    }))
}

fn rename(service: &ListService, id: &str, request: &HttpRequest) -> Result<HttpResponse> {
    let id = decode_segment(id)?;
    let body: RenameBody = parse_body(request)?;
    let entry = service.rename(&id, &body.name)?;

    Ok(HttpResponse::ok_json(&Message {
        message: format!("List renamed to {}", entry.name),
    }))
}

fn delete(service: &ListService, id: &str) -> Result<HttpResponse> {
    let id = decode_segment(id)?;
    let message = if service.delete(&id)? {
        format!("List {} deleted", id)
    } else {
        format!("List {} did not exist", id)
    };
    Ok(HttpResponse::ok_json(&Message { message }))
}

fn append(service: &ListService, id: &str, request: &HttpRequest) -> Result<HttpResponse> {
    let id = decode_segment(id)?;
    let body: AppendBody = parse_body(request)?;
    let records = parse_entries(&body.accounts)?;
    let total = service.append(&id, records)?;

    Ok(HttpResponse::ok_json(&Appended {
        success: true,
        total,
    }))
}

fn download(
    service: &ListService,
    id: &str,
    query: &HashMap<String, String>,
) -> Result<HttpResponse> {
    let id = decode_segment(id)?;
    let include_email = match query.get("includeEmail").map(String::as_str) {
        None | Some("") | Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(other) => {
            return Err(VaultError::Invalid(format!(
                "includeEmail must be true or false, got {:?}",
                other
            )))
        }
    };

    Ok(HttpResponse::ok_plain(service.download(&id, include_email)?))
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_body<T: DeserializeOwned>(request: &HttpRequest) -> Result<T> {
    serde_json::from_slice(&request.body)
        .map_err(|e| VaultError::Invalid(format!("invalid request body: {}", e)))
}

fn parse_query_u64(query: &HashMap<String, String>, name: &str) -> Result<Option<u64>> {
    match query.get(name) {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| VaultError::Invalid(format!("{} must be a non-negative integer", name))),
    }
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let (path, query_str) = target
        .split_once('?')
        .map(|(path, query)| (path, Some(query)))
        .unwrap_or((target, None));

    let mut query = HashMap::new();
    if let Some(query_str) = query_str {
        for pair in query_str.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            query.insert(k.to_string(), v.to_string());
        }
    }
    (path.to_string(), query)
}

/// Percent-decode one path segment
fn decode_segment(segment: &str) -> Result<String> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| VaultError::Invalid(format!("bad escape in path: {}", segment)))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out)
        .map_err(|_| VaultError::Invalid(format!("path is not valid UTF-8: {}", segment)))
}
