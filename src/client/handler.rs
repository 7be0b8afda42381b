use crate::client::state::CloseReason;
use crate::http::request::Request;
use crate::http::response::Response;

/// Whether a hook consumed a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The hook took care of it; the matching signal is not emitted.
    Yes,
    /// Fall through to the default behavior: emit the matching signal.
    No,
}

/// Extension points invoked by [`ClientSession`](crate::client::ClientSession).
///
/// Every method has a default, so implementors override only what they need.
/// The two `*_ready` hooks decide whether the session's default notification
/// still fires.
pub trait SessionHandler {
    /// Called once the connection is up, with a fresh request to populate
    /// before it is written. Returning [`Handled::No`] emits `http_connected`.
    fn on_request_ready(&mut self, _request: &mut Request) -> Handled {
        Handled::No
    }

    /// Called when the status line and headers are available. Returning
    /// [`Handled::No`] emits `new_response`.
    fn on_response_ready(&mut self, _response: &Response) -> Handled {
        Handled::No
    }

    /// Called for each piece of response body, in arrival order.
    fn on_body(&mut self, _chunk: &[u8]) {}

    fn on_response_end(&mut self, _response: &Response) {}

    /// Called once when the connection closes, whatever the cause.
    fn on_closed(&mut self, _reason: &CloseReason) {}
}

/// Handler that overrides nothing: every notification goes to the signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

impl SessionHandler for DefaultHandler {}
