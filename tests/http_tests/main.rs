//! HTTP API Tests
//!
//! Routing is exercised directly through `handle_request`; one module starts
//! the axum server on a loopback port.

#[path = "../common/mod.rs"]
mod common;

mod server_tests;

use listvault::http::{handle_request, HttpRequest, HttpResponse};
use listvault::ListService;
use serde_json::Value;

pub fn get(service: &ListService, target: &str) -> HttpResponse {
    handle_request(service, &HttpRequest::new("GET", target))
}

pub fn send(service: &ListService, method: &str, target: &str, body: Value) -> HttpResponse {
    let request = HttpRequest::new(method, target).with_body(body.to_string());
    handle_request(service, &request)
}

pub fn json(response: &HttpResponse) -> Value {
    serde_json::from_str(&response.body).unwrap()
}
