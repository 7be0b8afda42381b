//! Session states and close reasons.

use std::fmt;
use std::time::Duration;

use crate::error::{ClientError, ProtocolError, RequestError};

/// Lifecycle state of a [`ClientSession`](crate::client::ClientSession).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No exchange in flight. A keep-alive connection may still be open.
    #[default]
    Idle,
    /// Waiting for the transport to report the connection.
    Connecting,
    /// Connected; the request is being set up by the caller.
    Connected,
    /// The request is being written.
    Sending,
    /// Request written, no response byte seen yet.
    AwaitingResponse,
    ReceivingResponse,
    Closed,
}

impl SessionState {
    /// True while an exchange is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::Connected
                | Self::Sending
                | Self::AwaitingResponse
                | Self::ReceivingResponse
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Sending => write!(f, "Sending"),
            Self::AwaitingResponse => write!(f, "AwaitingResponse"),
            Self::ReceivingResponse => write!(f, "ReceivingResponse"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Why a session moved to [`SessionState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called.
    Requested,
    /// The exchange finished and the connection could not be kept alive.
    Completed,
    /// The server closed an idle connection.
    PeerClosed,
    Transport(String),
    Protocol(ProtocolError),
    TimedOut(Duration),
    /// The populated request could not be serialized.
    InvalidRequest(RequestError),
}

impl CloseReason {
    /// Maps failure reasons onto [`ClientError`]; clean closes yield `None`.
    pub fn error(&self) -> Option<ClientError> {
        match self {
            Self::Requested | Self::Completed | Self::PeerClosed => None,
            Self::Transport(msg) => Some(ClientError::Transport(msg.clone())),
            Self::Protocol(e) => Some(ClientError::Protocol(e.clone())),
            Self::TimedOut(d) => Some(ClientError::Timeout(*d)),
            Self::InvalidRequest(e) => Some(ClientError::InvalidRequest(e.clone())),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "closed by caller"),
            Self::Completed => write!(f, "exchange completed"),
            Self::PeerClosed => write!(f, "closed by peer"),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Protocol(e) => write!(f, "protocol error: {}", e),
            Self::TimedOut(d) => write!(f, "timed out after {:?}", d),
            Self::InvalidRequest(e) => write!(f, "invalid request: {}", e),
        }
    }
}
