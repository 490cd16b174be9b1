//! Tests for the axum server

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::common::setup_memory_service;

// =============================================================================
// Helper Functions
// =============================================================================

/// Send one raw HTTP/1.1 request and return the whole response text
async fn raw_request(addr: SocketAddr, request: String) -> String {
    tokio::task::spawn_blocking(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    })
    .await
    .unwrap()
}

// =============================================================================
// Serving
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_routes_requests() {
    let (_kv, service) = setup_memory_service();
    let service = Arc::new(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(listvault::http::serve(Arc::clone(&service), listener, async {
        let _ = stop_rx.await;
    }));

    let health = raw_request(
        addr,
        "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.contains("application/json"));
    assert!(health.ends_with("{\"status\":\"ok\"}"));

    let body = "{\"name\":\"over-http\",\"accounts\":[\"a|b\"]}";
    let created = raw_request(
        addr,
        format!(
            "POST /lists HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
    )
    .await;
    assert!(created.starts_with("HTTP/1.1 200"));
    assert_eq!(service.resolve("over-http").unwrap().total, 1);

    let missing = raw_request(
        addr,
        "GET /lists/nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
    )
    .await;
    assert!(missing.starts_with("HTTP/1.1 404"));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[test]
fn test_body_limit_covers_largest_chunk() {
    let (_kv, service) = setup_memory_service();
    let limit = listvault::http::body_limit(&service);
    assert!(limit > service.config().max_chunk_bytes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_declared_oversized_body_is_rejected() {
    let (_kv, service) = setup_memory_service();
    let service = Arc::new(service);
    let limit = listvault::http::body_limit(&service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(listvault::http::serve(Arc::clone(&service), listener, async {
        let _ = stop_rx.await;
    }));

    let rejected = raw_request(
        addr,
        format!(
            "POST /lists HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            limit + 1
        ),
    )
    .await;
    assert!(rejected.starts_with("HTTP/1.1 413"));
    assert!(service.list_all().unwrap().is_empty());

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
