//! Error types for the client.
//!
//! Only [`RequestError`] is ever returned synchronously. Everything that goes
//! wrong after a connection attempt has started is reported through the
//! session's close path as a [`CloseReason`](crate::client::CloseReason),
//! which maps onto [`ClientError`] for callers of the async driver.

use std::time::Duration;

use thiserror::Error;

/// A request that cannot be sent. Detected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),

    #[error("invalid header field: {0:?}")]
    InvalidHeader(String),

    /// A request is already in flight on this connection.
    #[error("an exchange is already in progress")]
    Busy,
}

/// Malformed or inconsistent data received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed status line: {0:?}")]
    InvalidStatusLine(String),

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed header line: {0:?}")]
    InvalidHeader(String),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    #[error("chunk data not terminated by CRLF")]
    MissingChunkTerminator,

    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("connection closed before the response was complete")]
    IncompleteMessage,

    #[error("unexpected data received while no request is in flight")]
    UnexpectedData,
}

/// Failure of a whole exchange, as seen by callers of the async driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),
}
