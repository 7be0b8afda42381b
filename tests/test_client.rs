//! End-to-end tests against in-process TCP servers

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{read_request, serve_once, silent_server};
use courier::client::{CloseReason, HttpClient, SessionState};
use courier::config::ClientConfig;
use courier::error::{ClientError, ProtocolError};
use courier::http::request::{Method, Request};
use courier::http::response::Response;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn config() -> ClientConfig {
    ClientConfig {
        timeout_ms: 2_000,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_fetch_content_length_response() {
    let (addr, server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello").await;
    let mut client = HttpClient::new(config());

    let response = client
        .fetch(Method::GET, &format!("http://{}/greeting?lang=en", addr))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.text(), "hello");
    assert_eq!(client.session().state(), SessionState::Closed);
    assert_eq!(client.session().close_reason(), Some(&CloseReason::Completed));

    let request = server.await.unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/greeting?lang=en");
    assert_eq!(request.header("Host"), Some(addr.to_string().as_str()));
}

#[tokio::test]
async fn test_fetch_chunked_response() {
    let (addr, _server) = serve_once(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    )
    .await;
    let mut client = HttpClient::new(config());

    let response = client
        .fetch(Method::GET, &format!("http://{}/", addr))
        .await
        .unwrap();

    assert_eq!(&response.body[..], b"Wikipedia");
    // Keep-alive: the exchange ends in Idle until the server hangs up
    assert_eq!(client.session().state(), SessionState::Idle);
}

#[tokio::test]
async fn test_post_body_populated_by_observer() {
    let (addr, server) = serve_once(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n").await;
    let mut client = HttpClient::new(config());
    client.signals().http_connected.connect(|req: &mut Request| {
        req.set_header("Content-Type", "text/plain");
        req.set_body("hello");
    });

    let response = client
        .fetch(Method::POST, &format!("http://{}/notes", addr))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 201);

    let request = server.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.header("Content-Type"), Some("text/plain"));
    assert_eq!(request.body, b"hello".to_vec());
}

#[tokio::test]
async fn test_read_until_close_response() {
    let (addr, _server) = serve_once(b"HTTP/1.0 200 OK\r\n\r\nuntil the end").await;
    let mut client = HttpClient::new(config());

    let response = client
        .fetch(Method::GET, &format!("http://{}/", addr))
        .await
        .unwrap();

    assert_eq!(response.text(), "until the end");
    assert_eq!(client.session().close_reason(), Some(&CloseReason::Completed));
}

#[tokio::test]
async fn test_timeout_against_silent_server() {
    let (addr, _server) = silent_server().await;
    let mut client = HttpClient::new(ClientConfig {
        timeout_ms: 100,
        ..ClientConfig::default()
    });

    let responses = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&responses);
    client
        .signals()
        .new_response
        .connect(move |_: &mut Response| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let start = Instant::now();
    client.request(Method::GET, &format!("http://{}/", addr)).unwrap();
    let result = client.run().await;
    let elapsed = start.elapsed();

    assert_eq!(result, Err(ClientError::Timeout(Duration::from_millis(100))));
    assert_eq!(client.session().state(), SessionState::Closed);
    assert!(elapsed >= Duration::from_millis(100), "closed early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "closed late: {:?}", elapsed);
    assert_eq!(responses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_status_line_from_server() {
    let (addr, _server) = serve_once(b"GARBAGE\r\n").await;
    let mut client = HttpClient::new(config());

    let result = client.fetch(Method::GET, &format!("http://{}/", addr)).await;

    assert_eq!(
        result.unwrap_err(),
        ClientError::Protocol(ProtocolError::InvalidStatusLine("GARBAGE".to_string()))
    );
    assert!(client.session().last_response().is_none());
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut client = HttpClient::new(config());

    let result = client.fetch(Method::GET, &format!("http://{}/", addr)).await;

    assert!(matches!(result, Err(ClientError::Transport(_))));
    assert_eq!(client.session().state(), SessionState::Closed);
}

#[tokio::test]
async fn test_invalid_url_is_rejected_synchronously() {
    let mut client = HttpClient::new(config());

    assert!(client.request(Method::GET, "ftp://127.0.0.1/").is_err());
    assert_eq!(client.session().state(), SessionState::Idle);
    assert_eq!(client.run().await, Ok(()));
}

#[tokio::test]
async fn test_keep_alive_connection_is_reused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut targets = Vec::new();
        for body in ["one", "two"] {
            let request = read_request(&mut socket).await;
            targets.push(request.target);
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
            socket.write_all(response.as_bytes()).await.unwrap();
        }
        targets
    });

    let mut client = HttpClient::new(config());
    let first = client.fetch(Method::GET, &format!("http://{}/a", addr)).await.unwrap();
    let second = client.fetch(Method::GET, &format!("http://{}/b", addr)).await.unwrap();

    assert_eq!(first.text(), "one");
    assert_eq!(second.text(), "two");
    assert_eq!(server.await.unwrap(), vec!["/a", "/b"]);
}
