//! Byte-stream transport used by the session.
//!
//! The session only ever calls the non-blocking [`Transport`] methods; the
//! outcome of each call comes back later as a [`TransportEvent`] which the
//! driver hands to the session.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::http::request::Endpoint;

/// Default buffer size for reads
const BUFFER_SIZE: usize = 8192;

/// A full-duplex connection that is opened, written and closed without
/// blocking.
pub trait Transport {
    /// Starts connecting. Completion is reported with
    /// [`TransportEvent::Connected`] or [`TransportEvent::Disconnected`].
    fn connect(&mut self, endpoint: &Endpoint) -> io::Result<()>;

    /// Queues bytes for writing, in order.
    fn write(&mut self, data: Bytes) -> io::Result<()>;

    /// Closes the connection. Must be safe to call when already closed.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Notifications delivered from the transport to the session.
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Data(Bytes),
    /// The connection is gone; `None` means an orderly close by the peer.
    Disconnected(Option<io::Error>),
}

/// Command sent to the connection task.
enum Command {
    Write(Bytes),
    Close,
}

/// Plaintext TCP transport backed by one tokio task per connection.
///
/// Every connection gets a generation number and its events are tagged with
/// it, so events still in flight from a closed connection are dropped by
/// [`TransportEvents`].
pub struct TokioTransport {
    events: mpsc::UnboundedSender<(u64, TransportEvent)>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    generation: Arc<AtomicU64>,
}

/// Receiving half of a [`TokioTransport`].
pub struct TransportEvents {
    rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    generation: Arc<AtomicU64>,
}

impl TokioTransport {
    pub fn new() -> (Self, TransportEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let transport = Self {
            events: tx,
            commands: None,
            generation: Arc::clone(&generation),
        };
        (transport, TransportEvents { rx, generation })
    }
}

impl Transport for TokioTransport {
    fn connect(&mut self, endpoint: &Endpoint) -> io::Result<()> {
        self.close();

        if endpoint.tls {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "TLS endpoints need a TLS-capable transport",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;

        let id = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);

        runtime.spawn(run_connection(id, endpoint.clone(), rx, self.events.clone()));
        Ok(())
    }

    fn write(&mut self, data: Bytes) -> io::Result<()> {
        let tx = self
            .commands
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))?;
        tx.send(Command::Write(data))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection task has exited"))
    }

    fn close(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(Command::Close);
            // Invalidate whatever the old connection still reports
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn is_open(&self) -> bool {
        self.commands.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl TransportEvents {
    /// Waits for the next event of the current connection.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            let (id, event) = self.rx.recv().await?;
            if id == self.generation.load(Ordering::Acquire) {
                return Some(event);
            }
            trace!(connection = id, "Dropping event from a stale connection");
        }
    }

    /// Returns an already queued event of the current connection, if any.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        while let Ok((id, event)) = self.rx.try_recv() {
            if id == self.generation.load(Ordering::Acquire) {
                return Some(event);
            }
        }
        None
    }
}

async fn run_connection(
    id: u64,
    endpoint: Endpoint,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<(u64, TransportEvent)>,
) {
    let send = |event: TransportEvent| {
        let _ = events.send((id, event));
    };

    // Nothing is written before Connected, so any command here is a close
    let stream = tokio::select! {
        res = TcpStream::connect((endpoint.host.as_str(), endpoint.port)) => res,
        _ = commands.recv() => {
            trace!(connection = id, "Connect abandoned");
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "Failed to connect");
            send(TransportEvent::Disconnected(Some(e)));
            return;
        }
    };
    let _ = stream.set_nodelay(true);

    debug!(endpoint = %endpoint, connection = id, "Connected");
    send(TransportEvent::Connected);

    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        buffer.reserve(BUFFER_SIZE);

        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Write(data)) => {
                    if let Err(e) = writer.write_all(&data).await {
                        send(TransportEvent::Disconnected(Some(e)));
                        return;
                    }
                    trace!(connection = id, bytes = data.len(), "Wrote to socket");
                }
                Some(Command::Close) | None => {
                    let _ = writer.shutdown().await;
                    trace!(connection = id, "Connection closed locally");
                    return;
                }
            },

            res = reader.read_buf(&mut buffer) => match res {
                Ok(0) => {
                    send(TransportEvent::Disconnected(None));
                    return;
                }
                Ok(n) => {
                    trace!(connection = id, bytes = n, "Read from socket");
                    send(TransportEvent::Data(buffer.split().freeze()));
                }
                Err(e) => {
                    send(TransportEvent::Disconnected(Some(e)));
                    return;
                }
            },
        }
    }
}
