//! Incremental HTTP/1.1 response parser.
//!
//! Bytes are pushed in with [`ResponseParser::feed`] as they arrive and
//! [`ParseEvent`]s are pulled out with [`ResponseParser::next_event`] until it
//! returns `Ok(None)`, meaning more input is needed. The parser never needs
//! the whole message: body bytes are handed out as soon as they are framed.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::error::ProtocolError;
use crate::http::headers::{is_valid_name, is_valid_value};
use crate::http::request::Method;
use crate::http::response::{StatusCode, Version};

/// Default cap on the size of a response head (status line plus headers).
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Longest chunk-size line accepted, extensions included.
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Status {
        version: Version,
        status: StatusCode,
        reason: String,
    },
    Header {
        name: String,
        value: String,
    },
    /// The blank line ending the head has been seen.
    HeadersComplete,
    Body(Bytes),
    End,
}

/// How the end of a response body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body at all (HEAD, 204, 304, 1xx).
    Empty,
    Length(u64),
    Chunked,
    /// Body ends when the server closes the connection.
    UntilClose,
}

#[derive(Debug)]
enum State {
    StatusLine,
    Headers,
    Length(u64),
    UntilClose,
    ChunkSize,
    ChunkData(u64),
    ChunkDataEnd,
    Trailers,
    Done,
    Failed(ProtocolError),
}

#[derive(Debug)]
struct Head {
    version: Version,
    status: StatusCode,
    reason: String,
    headers: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct ResponseParser {
    state: State,
    buf: BytesMut,
    events: VecDeque<ParseEvent>,
    head: Option<Head>,
    head_bytes: usize,
    max_head_bytes: usize,
    body_allowed: bool,
    framing: Option<Framing>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::for_method(Method::GET)
    }

    /// Creates a parser for the response to a `method` request. Responses to
    /// `HEAD` never carry a body whatever their headers announce.
    pub fn for_method(method: Method) -> Self {
        Self {
            state: State::StatusLine,
            buf: BytesMut::with_capacity(4096),
            events: VecDeque::new(),
            head: None,
            head_bytes: 0,
            max_head_bytes: MAX_HEAD_BYTES,
            body_allowed: method != Method::HEAD,
            framing: None,
        }
    }

    pub fn with_max_head_bytes(mut self, max: usize) -> Self {
        self.max_head_bytes = max;
        self
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next event, `Ok(None)` when more input is needed.
    ///
    /// Errors are sticky: once the stream is malformed every later call
    /// returns the same error.
    pub fn next_event(&mut self) -> Result<Option<ParseEvent>, ProtocolError> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            if let State::Failed(e) = &self.state {
                return Err(e.clone());
            }
            match self.step() {
                Ok(true) => continue,
                Ok(false) => return Ok(None),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Signals that the connection was closed by the peer.
    ///
    /// Completes a read-until-close body. Queues nothing when no response
    /// byte was ever received. Any other partial message is an error.
    pub fn finish(&mut self) -> Result<(), ProtocolError> {
        match &self.state {
            State::UntilClose => {
                self.state = State::Done;
                self.events.push_back(ParseEvent::End);
                Ok(())
            }
            State::Done => Ok(()),
            State::StatusLine if !self.has_started() => Ok(()),
            State::Failed(e) => Err(e.clone()),
            _ => Err(self.fail(ProtocolError::IncompleteMessage)),
        }
    }

    /// True once any part of a final response has been received.
    pub fn has_started(&self) -> bool {
        self.head.is_some() || !self.buf.is_empty() || !matches!(self.state, State::StatusLine)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// True while fed bytes are waiting to be parsed. After the end of a
    /// response these belong to no message.
    pub fn has_buffered(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Body framing of the current response, known once the head is parsed.
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    fn fail(&mut self, e: ProtocolError) -> ProtocolError {
        self.events.clear();
        self.state = State::Failed(e.clone());
        e
    }

    fn step(&mut self) -> Result<bool, ProtocolError> {
        match self.state {
            State::StatusLine => {
                let Some(line) = self.take_line() else {
                    self.check_head_size(self.buf.len())?;
                    return Ok(false);
                };
                // Stray CRLF left over from a previous message
                if line.is_empty() {
                    return Ok(true);
                }
                self.head_bytes = line.len() + 2;
                self.check_head_size(0)?;
                self.head = Some(parse_status_line(&line)?);
                self.state = State::Headers;
                Ok(true)
            }

            State::Headers => {
                let Some(line) = self.take_line() else {
                    self.check_head_size(self.buf.len())?;
                    return Ok(false);
                };
                self.head_bytes += line.len() + 2;
                self.check_head_size(0)?;

                if line.is_empty() {
                    self.finish_head()?;
                } else {
                    let field = parse_header_line(&line)?;
                    if let Some(head) = self.head.as_mut() {
                        head.headers.push(field);
                    }
                }
                Ok(true)
            }

            State::Length(remaining) => {
                let Some((chunk, left)) = self.take_body(remaining) else {
                    return Ok(false);
                };
                self.events.push_back(ParseEvent::Body(chunk));
                if left == 0 {
                    self.end();
                } else {
                    self.state = State::Length(left);
                }
                Ok(true)
            }

            State::UntilClose => {
                if self.buf.is_empty() {
                    return Ok(false);
                }
                let chunk = self.buf.split().freeze();
                self.events.push_back(ParseEvent::Body(chunk));
                Ok(true)
            }

            State::ChunkSize => {
                let Some(line) = self.take_line() else {
                    if self.buf.len() > MAX_CHUNK_LINE {
                        let preview = String::from_utf8_lossy(&self.buf[..32]).into_owned();
                        return Err(ProtocolError::InvalidChunkSize(preview));
                    }
                    return Ok(false);
                };
                let size = parse_chunk_size(&line)?;
                trace!(size, "Chunk header");
                self.state = if size == 0 {
                    State::Trailers
                } else {
                    State::ChunkData(size)
                };
                Ok(true)
            }

            State::ChunkData(remaining) => {
                let Some((chunk, left)) = self.take_body(remaining) else {
                    return Ok(false);
                };
                self.events.push_back(ParseEvent::Body(chunk));
                self.state = if left == 0 {
                    State::ChunkDataEnd
                } else {
                    State::ChunkData(left)
                };
                Ok(true)
            }

            State::ChunkDataEnd => {
                if self.buf.len() < 2 {
                    return Ok(false);
                }
                if &self.buf[..2] != b"\r\n" {
                    return Err(ProtocolError::MissingChunkTerminator);
                }
                self.buf.advance(2);
                self.state = State::ChunkSize;
                Ok(true)
            }

            State::Trailers => {
                let Some(line) = self.take_line() else {
                    if self.buf.len() > self.max_head_bytes {
                        return Err(ProtocolError::HeadTooLarge(self.max_head_bytes));
                    }
                    return Ok(false);
                };
                if line.is_empty() {
                    self.end();
                } else {
                    let (name, _) = parse_header_line(&line)?;
                    trace!(trailer = %name, "Discarding trailer field");
                }
                Ok(true)
            }

            State::Done | State::Failed(_) => Ok(false),
        }
    }

    fn finish_head(&mut self) -> Result<(), ProtocolError> {
        let Some(head) = self.head.take() else {
            return Err(ProtocolError::IncompleteMessage);
        };
        self.head_bytes = 0;

        if head.status.is_informational() && head.status != StatusCode::SWITCHING_PROTOCOLS {
            trace!(status = %head.status, "Skipping interim response");
            self.state = State::StatusLine;
            return Ok(());
        }

        let framing = if !self.body_allowed || head.status.forbids_body() {
            Framing::Empty
        } else {
            framing_for(&head.headers)?
        };
        self.framing = Some(framing);

        self.events.push_back(ParseEvent::Status {
            version: head.version,
            status: head.status,
            reason: head.reason,
        });
        for (name, value) in head.headers {
            self.events.push_back(ParseEvent::Header { name, value });
        }
        self.events.push_back(ParseEvent::HeadersComplete);

        match framing {
            Framing::Empty | Framing::Length(0) => self.end(),
            Framing::Length(n) => self.state = State::Length(n),
            Framing::Chunked => self.state = State::ChunkSize,
            Framing::UntilClose => self.state = State::UntilClose,
        }
        Ok(())
    }

    fn end(&mut self) {
        self.events.push_back(ParseEvent::End);
        self.state = State::Done;
    }

    fn check_head_size(&self, pending: usize) -> Result<(), ProtocolError> {
        if self.head_bytes + pending > self.max_head_bytes {
            return Err(ProtocolError::HeadTooLarge(self.max_head_bytes));
        }
        Ok(())
    }

    /// Splits off one CRLF-terminated line, without the terminator.
    fn take_line(&mut self) -> Option<BytesMut> {
        let pos = self.buf.windows(2).position(|w| w == b"\r\n")?;
        let mut line = self.buf.split_to(pos + 2);
        line.truncate(pos);
        Some(line)
    }

    /// Takes up to `remaining` buffered body bytes.
    fn take_body(&mut self, remaining: u64) -> Option<(Bytes, u64)> {
        if self.buf.is_empty() {
            return None;
        }
        let take = usize::try_from(remaining).unwrap_or(usize::MAX).min(self.buf.len());
        let chunk = self.buf.split_to(take).freeze();
        Some((chunk, remaining - take as u64))
    }
}

fn parse_status_line(line: &[u8]) -> Result<Head, ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidStatusLine(String::from_utf8_lossy(line).into_owned()))?;
    let invalid = || ProtocolError::InvalidStatusLine(text.to_string());

    let (version, rest) = text.split_once(' ').ok_or_else(invalid)?;
    let version = match version {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        v if v.starts_with("HTTP/") => return Err(ProtocolError::UnsupportedVersion(v.to_string())),
        _ => return Err(invalid()),
    };

    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(StatusCode::from_u16)
        .ok_or_else(invalid)?;

    Ok(Head {
        version,
        status,
        reason: reason.to_string(),
        headers: Vec::new(),
    })
}

fn parse_header_line(line: &[u8]) -> Result<(String, String), ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidHeader(String::from_utf8_lossy(line).into_owned()))?;
    let invalid = || ProtocolError::InvalidHeader(text.to_string());

    // Obsolete line folding is rejected outright
    if text.starts_with([' ', '\t']) {
        return Err(invalid());
    }

    let (name, value) = text.split_once(':').ok_or_else(invalid)?;
    let value = value.trim_matches([' ', '\t']);
    if !is_valid_name(name) || !is_valid_value(value) {
        return Err(invalid());
    }

    Ok((name.to_string(), value.to_string()))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtocolError> {
    let text = String::from_utf8_lossy(line);
    let invalid = || ProtocolError::InvalidChunkSize(text.to_string());

    let size = text.split(';').next().unwrap_or("").trim_matches([' ', '\t']);
    if size.is_empty() || size.len() > 16 || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    u64::from_str_radix(size, 16).map_err(|_| invalid())
}

fn framing_for(headers: &[(String, String)]) -> Result<Framing, ProtocolError> {
    let mut coding: Option<String> = None;
    let mut length: Option<u64> = None;

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("Transfer-Encoding") {
            if let Some(last) = value.split(',').map(str::trim).filter(|c| !c.is_empty()).last() {
                coding = Some(last.to_ascii_lowercase());
            }
        } else if name.eq_ignore_ascii_case("Content-Length") {
            for part in value.split(',').map(str::trim) {
                let invalid = || ProtocolError::InvalidContentLength(value.clone());
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let n: u64 = part.parse().map_err(|_| invalid())?;
                match length {
                    Some(prev) if prev != n => return Err(invalid()),
                    _ => length = Some(n),
                }
            }
        }
    }

    Ok(match (coding.as_deref(), length) {
        (Some("chunked"), _) => Framing::Chunked,
        (Some(_), _) => Framing::UntilClose,
        (None, Some(n)) => Framing::Length(n),
        (None, None) => Framing::UntilClose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(parser: &mut ResponseParser) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        while let Some(event) = parser.next_event().unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn head_events_are_released_together() {
        let mut parser = ResponseParser::new();
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n");
        assert!(drain(&mut parser).is_empty());

        parser.feed(b"\r\n");
        let events = drain(&mut parser);
        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&ParseEvent::End));
        assert!(parser.is_complete());
    }

    #[test]
    fn chunk_size_accepts_extensions() {
        assert_eq!(parse_chunk_size(b"1a;name=value").unwrap(), 26);
        assert!(parse_chunk_size(b"zz").is_err());
        assert!(parse_chunk_size(b"").is_err());
    }

    #[test]
    fn bytes_past_the_end_stay_buffered() {
        let mut parser = ResponseParser::new();
        parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokJUNK");
        assert_eq!(drain(&mut parser).last(), Some(&ParseEvent::End));
        assert!(parser.is_complete());
        assert!(parser.has_buffered());
    }

    #[test]
    fn finish_without_any_bytes_queues_nothing() {
        let mut parser = ResponseParser::new();
        parser.finish().unwrap();
        assert!(drain(&mut parser).is_empty());
        assert!(!parser.has_started());
    }
}
