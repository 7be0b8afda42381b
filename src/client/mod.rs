//! HTTP/1.1 client session.
//!
//! # Architecture
//!
//! - **`session`**: the connection state machine, free of any I/O
//! - **`transport`**: the `Transport` seam and the tokio TCP implementation
//! - **`handler`**: overridable hooks deciding whether default signals fire
//! - **`signal`**: observer lists
//! - **`state`**: session states and close reasons
//!
//! # Session State Machine
//!
//! ```text
//!        ┌─────────────┐  request(url)   ┌──────────────┐
//!        │    Idle     │ ──────────────▶ │  Connecting  │
//!        └─────────────┘                 └──────┬───────┘
//!               ▲                               │ transport connected
//!               │                               ▼
//!               │                        ┌──────────────┐
//!               │                        │  Connected   │ ← on_request_ready / http_connected
//!               │                        └──────┬───────┘
//!               │                               ▼
//!               │                        ┌──────────────┐
//!               │                        │   Sending    │
//!               │                        └──────┬───────┘
//!               │                               ▼
//!               │                        ┌──────────────────┐
//!               │                        │ AwaitingResponse │
//!               │                        └──────┬───────────┘
//!               │  keep-alive                   ▼
//!               │                        ┌───────────────────┐
//!               └─────────────────────── │ ReceivingResponse │ ← on_response_ready / new_response
//!                                        └──────┬────────────┘
//!                                               │ close, timeout, error
//!                                               ▼
//!                                            Closed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use courier::client::HttpClient;
//! use courier::config::ClientConfig;
//! use courier::http::request::Method;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), courier::error::ClientError> {
//!     let mut client = HttpClient::new(ClientConfig::default());
//!     client.signals().new_response.connect(|res| println!("status {}", res.status));
//!
//!     let response = client.fetch(Method::GET, "http://127.0.0.1:8080/").await?;
//!     println!("{}", response.text());
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod session;
pub mod signal;
pub mod state;
pub mod transport;

pub use handler::{DefaultHandler, Handled, SessionHandler};
pub use session::{ClientSession, Signals};
pub use signal::Signal;
pub use state::{CloseReason, SessionState};
pub use transport::{TokioTransport, Transport, TransportEvent, TransportEvents};

use std::io;
use std::time::{Duration, Instant};

use tokio::time::{self, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::error::{ClientError, RequestError};
use crate::http::request::Method;
use crate::http::response::Response;

/// Drives a [`ClientSession`] over TCP on the current tokio runtime.
///
/// Transport events and timer ticks are fed to the session one at a time
/// from the task calling [`run`](Self::run).
pub struct HttpClient<H: SessionHandler = DefaultHandler> {
    session: ClientSession<TokioTransport, H>,
    events: TransportEvents,
    tick: Duration,
}

impl HttpClient<DefaultHandler> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_handler(config, DefaultHandler)
    }
}

impl<H: SessionHandler> HttpClient<H> {
    pub fn with_handler(config: ClientConfig, handler: H) -> Self {
        let (transport, events) = TokioTransport::new();
        let tick = config.timer_resolution();
        Self {
            session: ClientSession::with_handler(transport, handler, config),
            events,
            tick,
        }
    }

    pub fn session(&self) -> &ClientSession<TokioTransport, H> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession<TokioTransport, H> {
        &mut self.session
    }

    pub fn signals(&mut self) -> &mut Signals {
        &mut self.session.signals
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.session.set_timeout(timeout);
    }

    /// Starts an exchange; see [`ClientSession::request`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&mut self, method: Method, url: &str) -> Result<(), RequestError> {
        // Catch up on an idle connection before deciding to reuse it
        while let Some(event) = self.events.try_recv() {
            self.session.handle_event(event);
        }
        self.session.handle_timer(Instant::now());

        self.session.request(method, url)
    }

    /// Processes events until the exchange in flight completes or the
    /// connection closes.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.session.state().is_busy() {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.session.handle_event(event),
                    None => self.session.handle_disconnected(Some(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "transport event channel closed",
                    ))),
                },
                _ = ticker.tick() => self.session.handle_timer(Instant::now()),
            }
        }

        match self.session.close_reason().and_then(CloseReason::error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Requests `url`, waits for the exchange and returns the response.
    pub async fn fetch(&mut self, method: Method, url: &str) -> Result<Response, ClientError> {
        self.request(method, url)?;
        self.run().await?;
        self.session
            .take_response()
            .ok_or_else(|| ClientError::Transport("connection closed without a response".into()))
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}
