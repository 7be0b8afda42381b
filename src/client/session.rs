//! The client connection state machine.
//!
//! [`ClientSession`] performs no I/O itself. It asks its [`Transport`] to
//! connect and write, and makes progress only when the driver reports what
//! happened through the `handle_*` methods. All of them return immediately.

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::client::handler::{DefaultHandler, Handled, SessionHandler};
use crate::client::signal::Signal;
use crate::client::state::{CloseReason, SessionState};
use crate::client::transport::{Transport, TransportEvent};
use crate::config::ClientConfig;
use crate::error::{ProtocolError, RequestError};
use crate::http::parser::{Framing, ParseEvent, ResponseParser};
use crate::http::request::{Body, Endpoint, Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer;

/// Observer lists fired by the session.
#[derive(Debug, Default)]
pub struct Signals {
    /// A connection is up and a fresh request awaits its headers and body.
    /// Not emitted when the handler's `on_request_ready` returns `Handled::Yes`.
    pub http_connected: Signal<Request>,
    /// Status line and headers of a response arrived. Not emitted when the
    /// handler's `on_response_ready` returns `Handled::Yes`.
    pub new_response: Signal<Response>,
    /// A piece of response body.
    pub data: Signal<Bytes>,
    /// The response is complete.
    pub end: Signal<Response>,
    /// The connection closed; fires exactly once per connection.
    pub disconnected: Signal<CloseReason>,
}

/// One HTTP/1.1 client connection and the exchange running on it.
///
/// At most one request/response pair is in flight; a response only exists
/// once its request has been written completely.
pub struct ClientSession<T: Transport, H: SessionHandler = DefaultHandler> {
    transport: T,
    handler: H,
    config: ClientConfig,
    timeout: Duration,
    state: SessionState,
    /// Method and URL of the exchange waiting for the connection.
    pending: Option<(Method, Url)>,
    endpoint: Option<Endpoint>,
    /// Start of the current connection attempt; the timeout counts from here.
    opened_at: Option<Instant>,
    request: Option<Request>,
    response: Option<Response>,
    parser: Option<ResponseParser>,
    keep_alive: bool,
    completed: Option<Response>,
    close_reason: Option<CloseReason>,
    pub signals: Signals,
}

impl<T: Transport> ClientSession<T, DefaultHandler> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_handler(transport, DefaultHandler, config)
    }
}

impl<T: Transport, H: SessionHandler> ClientSession<T, H> {
    pub fn with_handler(transport: T, handler: H, config: ClientConfig) -> Self {
        Self {
            transport,
            handler,
            timeout: config.timeout(),
            config,
            state: SessionState::Idle,
            pending: None,
            endpoint: None,
            opened_at: None,
            request: None,
            response: None,
            parser: None,
            keep_alive: false,
            completed: None,
            close_reason: None,
            signals: Signals::default(),
        }
    }

    /// Starts an exchange with the server named by `url`.
    ///
    /// `Ok` means a connection attempt was initiated (or an idle keep-alive
    /// connection to the same endpoint is being reused); everything after
    /// that is reported asynchronously. An invalid URL returns an error and
    /// leaves the session untouched.
    pub fn request(&mut self, method: Method, url: &str) -> Result<(), RequestError> {
        if self.state.is_busy() {
            return Err(RequestError::Busy);
        }

        let (url, endpoint) = Endpoint::parse(url).inspect_err(|e| {
            debug!(error = %e, url = %url, "Rejected request");
        })?;

        let reusable = self.state == SessionState::Idle
            && self.transport.is_open()
            && self.endpoint.as_ref() == Some(&endpoint);

        if !reusable && self.transport.is_open() {
            debug!(endpoint = %endpoint, "Replacing idle connection to another endpoint");
            self.teardown(CloseReason::Requested);
        }

        self.close_reason = None;
        self.completed = None;
        self.pending = Some((method, url));

        if reusable {
            debug!(endpoint = %endpoint, method = %method, "Reusing idle connection");
            self.on_connected();
            return Ok(());
        }

        info!(endpoint = %endpoint, method = %method, "Connecting");
        self.state = SessionState::Connecting;
        self.opened_at = Some(Instant::now());
        self.endpoint = Some(endpoint.clone());

        if let Err(e) = self.transport.connect(&endpoint) {
            self.teardown(CloseReason::Transport(e.to_string()));
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.handle_connected(),
            TransportEvent::Data(data) => self.handle_data(&data),
            TransportEvent::Disconnected(error) => self.handle_disconnected(error),
        }
    }

    /// The transport finished connecting.
    pub fn handle_connected(&mut self) {
        if self.state != SessionState::Connecting {
            trace!(state = %self.state, "Ignoring connect notification");
            return;
        }
        debug!("Connection established");
        self.on_connected();
    }

    /// Bytes arrived from the server.
    pub fn handle_data(&mut self, data: &[u8]) {
        match self.state {
            SessionState::AwaitingResponse => self.state = SessionState::ReceivingResponse,
            SessionState::ReceivingResponse => {}
            SessionState::Idle if self.transport.is_open() => {
                warn!(bytes = data.len(), "Data received on an idle connection");
                self.teardown(CloseReason::Protocol(ProtocolError::UnexpectedData));
                return;
            }
            _ => {
                trace!(state = %self.state, bytes = data.len(), "Ignoring data");
                return;
            }
        }

        if let Some(parser) = self.parser.as_mut() {
            parser.feed(data);
        }
        self.drain_parser();
    }

    /// The connection went away. `None` is an orderly close by the peer.
    pub fn handle_disconnected(&mut self, error: Option<io::Error>) {
        if self.state == SessionState::Closed {
            return;
        }

        let receiving = matches!(
            self.state,
            SessionState::AwaitingResponse | SessionState::ReceivingResponse
        );
        if receiving && error.is_none() {
            if let Some(parser) = self.parser.as_mut() {
                if parser.has_started() {
                    if let Err(e) = parser.finish() {
                        warn!(error = %e, "Connection closed mid-response");
                        self.teardown(CloseReason::Protocol(e));
                        return;
                    }
                    // A read-until-close body ends here
                    self.drain_parser();
                    if self.state == SessionState::Closed {
                        return;
                    }
                }
            }
        }

        let reason = match error {
            Some(e) => CloseReason::Transport(e.to_string()),
            None if self.state.is_busy() => {
                CloseReason::Transport("connection closed before the response was received".into())
            }
            None => CloseReason::PeerClosed,
        };
        self.teardown(reason);
    }

    /// Timer tick: closes the connection once its deadline has passed.
    pub fn handle_timer(&mut self, now: Instant) {
        let Some(deadline) = self.deadline() else {
            return;
        };
        if now >= deadline && self.state != SessionState::Closed {
            warn!(
                timeout = ?self.timeout,
                state = %self.state,
                "Connection timed out"
            );
            self.teardown(CloseReason::TimedOut(self.timeout));
        }
    }

    /// Closes the connection. Does nothing when nothing is open.
    pub fn close(&mut self) {
        match self.state {
            SessionState::Closed => {}
            SessionState::Idle if !self.transport.is_open() => {}
            _ => self.teardown(CloseReason::Requested),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Closed && self.transport.is_open()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the connection timeout; zero disables it. Applies to the open
    /// connection too, measured from when it was opened.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// When the open connection will be force-closed, if ever.
    pub fn deadline(&self) -> Option<Instant> {
        if self.timeout.is_zero() {
            return None;
        }
        self.opened_at.map(|t| t + self.timeout)
    }

    /// Why the last connection closed; cleared when a new request starts.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// The most recently completed response.
    pub fn last_response(&self) -> Option<&Response> {
        self.completed.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.completed.take()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn on_connected(&mut self) {
        let Some((method, url)) = self.pending.take() else {
            self.state = SessionState::Idle;
            return;
        };
        self.state = SessionState::Connected;

        let mut request = Request::from_url(method, url);
        if !self.config.user_agent.is_empty() {
            request.headers.insert("User-Agent", self.config.user_agent.clone());
        }
        if !self.config.keep_alive {
            request.headers.insert("Connection", "close");
        }

        if self.handler.on_request_ready(&mut request) == Handled::No {
            self.signals.http_connected.emit(&mut request);
        }

        self.send_request(request);
    }

    fn send_request(&mut self, mut request: Request) {
        self.state = SessionState::Sending;

        let head = match writer::encode_head(&request) {
            Ok(head) => head,
            Err(e) => {
                warn!(error = %e, "Request could not be serialized");
                self.teardown(CloseReason::InvalidRequest(e));
                return;
            }
        };

        debug!(
            method = %request.method,
            target = %request.target(),
            bytes = head.len(),
            "Sending request"
        );
        if !self.write(head.freeze()) {
            return;
        }

        if request.body.is_stream() {
            if let Body::Stream(chunks) = std::mem::take(&mut request.body) {
                for chunk in chunks {
                    let frame = writer::encode_chunk(&chunk);
                    if !frame.is_empty() && !self.write(frame) {
                        return;
                    }
                }
                if !self.write(Bytes::from_static(writer::LAST_CHUNK)) {
                    return;
                }
            }
        }

        self.keep_alive = self.config.keep_alive && request.keep_alive();
        self.parser = Some(
            ResponseParser::for_method(request.method).with_max_head_bytes(self.config.max_head_bytes),
        );
        self.request = Some(request);
        self.state = SessionState::AwaitingResponse;
    }

    /// Hands bytes to the transport, tearing down on failure.
    fn write(&mut self, data: Bytes) -> bool {
        match self.transport.write(data) {
            Ok(()) => true,
            Err(e) => {
                self.teardown(CloseReason::Transport(e.to_string()));
                false
            }
        }
    }

    fn drain_parser(&mut self) {
        loop {
            let Some(parser) = self.parser.as_mut() else {
                return;
            };
            match parser.next_event() {
                Ok(Some(event)) => self.on_parse_event(event),
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "Malformed response");
                    self.teardown(CloseReason::Protocol(e));
                    return;
                }
            }
        }
    }

    fn on_parse_event(&mut self, event: ParseEvent) {
        match event {
            ParseEvent::Status {
                version,
                status,
                reason,
            } => {
                trace!(status = %status, "Status line");
                self.response = Some(Response::new(version, status, reason));
            }

            ParseEvent::Header { name, value } => {
                if let Some(response) = self.response.as_mut() {
                    response.headers.merge(name, value);
                }
            }

            ParseEvent::HeadersComplete => {
                let Some(response) = self.response.as_mut() else {
                    return;
                };
                debug!(status = %response.status, "Response head received");
                if self.handler.on_response_ready(response) == Handled::No {
                    self.signals.new_response.emit(response);
                }
            }

            ParseEvent::Body(mut chunk) => {
                self.handler.on_body(&chunk);
                if self.config.collect_body {
                    if let Some(response) = self.response.as_mut() {
                        response.body.extend_from_slice(&chunk);
                    }
                }
                self.signals.data.emit(&mut chunk);
            }

            ParseEvent::End => self.finish_exchange(),
        }
    }

    fn finish_exchange(&mut self) {
        let parser = self.parser.take();
        let framing = parser.as_ref().and_then(ResponseParser::framing);
        let leftover = parser.as_ref().is_some_and(ResponseParser::has_buffered);
        self.request = None;
        let Some(mut response) = self.response.take() else {
            return;
        };

        let reusable = self.keep_alive
            && response.keep_alive()
            && response.status != StatusCode::SWITCHING_PROTOCOLS
            && framing != Some(Framing::UntilClose);

        info!(
            status = %response.status,
            body_bytes = response.body.len(),
            keep_alive = reusable,
            "Response complete"
        );

        self.handler.on_response_end(&response);
        self.signals.end.emit(&mut response);
        self.completed = Some(response);

        if reusable && leftover {
            // Bytes past the end of the response belong to no request
            warn!("Data received after the end of the response");
            self.teardown(CloseReason::Protocol(ProtocolError::UnexpectedData));
        } else if reusable {
            self.state = SessionState::Idle;
        } else {
            self.teardown(CloseReason::Completed);
        }
    }

    /// Releases everything tied to the connection and notifies once.
    fn teardown(&mut self, reason: CloseReason) {
        self.transport.close();
        self.pending = None;
        self.request = None;
        self.response = None;
        self.parser = None;
        self.opened_at = None;
        self.endpoint = None;
        self.state = SessionState::Closed;

        if reason.is_error() {
            warn!(reason = %reason, "Connection closed");
        } else {
            debug!(reason = %reason, "Connection closed");
        }

        self.close_reason = Some(reason.clone());
        self.handler.on_closed(&reason);
        let mut reason = reason;
        self.signals.disconnected.emit(&mut reason);
    }
}
