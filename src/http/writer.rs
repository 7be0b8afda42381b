use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RequestError;
use crate::http::headers::{is_valid_name, is_valid_value};
use crate::http::request::{Body, Endpoint, Request};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Terminator of a chunked body: zero-size chunk, no trailers.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Serializes the request line, headers and, for buffered bodies, the body.
///
/// `Host` is derived from the URL unless the caller set one. Framing headers
/// supplied by the caller are replaced by the ones matching `request.body`.
/// Streamed bodies are not consumed here; write them with [`encode_chunk`]
/// followed by [`LAST_CHUNK`].
pub fn encode_head(request: &Request) -> Result<BytesMut, RequestError> {
    let endpoint = Endpoint::from_url(&request.url)?;
    let mut buf = BytesMut::with_capacity(256);

    // Request line
    buf.put_slice(request.method.as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(request.target().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(HTTP_VERSION.as_bytes());
    buf.put_slice(b"\r\n");

    if !request.headers.contains("Host") {
        put_header(&mut buf, "Host", &endpoint.authority);
    }

    for (name, value) in request.headers.iter() {
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            continue;
        }
        if !is_valid_name(name) || !is_valid_value(value) {
            return Err(RequestError::InvalidHeader(name.to_string()));
        }
        put_header(&mut buf, name, value);
    }

    match &request.body {
        Body::Empty if request.method.expects_body() => {
            put_header(&mut buf, "Content-Length", "0");
        }
        Body::Empty => {}
        Body::Full(bytes) => {
            put_header(&mut buf, "Content-Length", &bytes.len().to_string());
        }
        Body::Stream(_) => {
            put_header(&mut buf, "Transfer-Encoding", "chunked");
        }
    }

    // Header/body separator
    buf.put_slice(b"\r\n");

    if let Body::Full(bytes) = &request.body {
        buf.put_slice(bytes);
    }

    Ok(buf)
}

/// Frames one piece of a streamed body. Empty input yields no bytes, since a
/// zero-size chunk would end the body early.
pub fn encode_chunk(data: &[u8]) -> Bytes {
    if data.is_empty() {
        return Bytes::new();
    }
    let mut buf = BytesMut::with_capacity(data.len() + 12);
    buf.put_slice(format!("{:X}\r\n", data.len()).as_bytes());
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Serializes a complete request, draining a streamed body.
pub fn serialize(mut request: Request) -> Result<Vec<u8>, RequestError> {
    let mut buf = encode_head(&request)?;
    if let Body::Stream(chunks) = std::mem::take(&mut request.body) {
        for chunk in chunks {
            buf.put_slice(&encode_chunk(&chunk));
        }
        buf.put_slice(LAST_CHUNK);
    }
    Ok(buf.to_vec())
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}
