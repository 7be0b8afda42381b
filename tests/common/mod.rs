#![allow(dead_code)]

//! Shared test helpers: an in-memory transport and a tiny HTTP server.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use courier::client::Transport;
use courier::http::request::Endpoint;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct MockState {
    pub connects: Vec<Endpoint>,
    pub written: Vec<u8>,
    pub writes: usize,
    pub closes: usize,
    pub open: bool,
    pub fail_connect: bool,
}

/// Records every call; the test plays the part of the network.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().written).into_owned()
    }

    pub fn is_open_now(&self) -> bool {
        self.state.lock().unwrap().open
    }

    pub fn clear_written(&self) {
        self.state.lock().unwrap().written.clear();
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, endpoint: &Endpoint) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(io::Error::other("no route to host"));
        }
        state.connects.push(endpoint.clone());
        state.open = true;
        Ok(())
    }

    fn write(&mut self, data: Bytes) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        }
        state.written.extend_from_slice(&data);
        state.writes += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.open {
            state.closes += 1;
        }
        state.open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

#[derive(Debug)]
pub enum ParseError {
    InvalidRequest,
    InvalidHeader,
    InvalidContentLength,
    InvalidChunk,
    Incomplete,
}

/// A request as seen by the mock server. Header names are lowercased.
#[derive(Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }
}

/// Server-side request parser, enough to check what the client sent.
pub fn parse_http_request(buf: &[u8]) -> Result<(ReceivedRequest, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let headers_str =
        std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");
    let mut parts = lines.next().ok_or(ParseError::InvalidRequest)?.split_whitespace();
    let method = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let body_start = headers_end + 4;
    let (body, consumed) = if headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        let (body, used) = decode_chunked(&buf[body_start..])?;
        (body, body_start + used)
    } else {
        let content_length = headers
            .get("content-length")
            .map(|v| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
            .transpose()?
            .unwrap_or(0);
        if buf.len() < body_start + content_length {
            return Err(ParseError::Incomplete);
        }
        (
            buf[body_start..body_start + content_length].to_vec(),
            body_start + content_length,
        )
    };

    let request = ReceivedRequest {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        body,
    };
    Ok((request, consumed))
}

fn decode_chunked(buf: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = buf[pos..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or(ParseError::Incomplete)?;
        let size_str =
            std::str::from_utf8(&buf[pos..pos + line_end]).map_err(|_| ParseError::InvalidChunk)?;
        let size = usize::from_str_radix(size_str.trim(), 16).map_err(|_| ParseError::InvalidChunk)?;
        pos += line_end + 2;

        if size == 0 {
            if buf.len() < pos + 2 {
                return Err(ParseError::Incomplete);
            }
            return Ok((body, pos + 2));
        }
        if buf.len() < pos + size + 2 {
            return Err(ParseError::Incomplete);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        pos += size + 2;
    }
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Reads one complete request from the stream.
pub async fn read_request(stream: &mut TcpStream) -> ReceivedRequest {
    let mut buffer = Vec::new();
    loop {
        match parse_http_request(&buffer) {
            Ok((request, _)) => return request,
            Err(ParseError::Incomplete) => {}
            Err(e) => panic!("client sent a malformed request: {:?}", e),
        }
        let mut temp = [0u8; 1024];
        let n = stream.read(&mut temp).await.unwrap();
        assert!(n > 0, "client closed before sending a full request");
        buffer.extend_from_slice(&temp[..n]);
    }
}

/// Accepts one connection, answers one request with `response` and closes.
pub async fn serve_once(response: &'static [u8]) -> (SocketAddr, JoinHandle<ReceivedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (addr, handle)
}

/// Accepts connections and never answers.
pub async fn silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    (addr, handle)
}
