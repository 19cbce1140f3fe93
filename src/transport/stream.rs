//! Event-driven transport over any byte stream.
//!
//! The stream is split into halves; each cycle races a read, a write or
//! flush (only while there is something to send) and the handle's wake-up
//! against the deadline, and handles the event that fires first. Streams come from a [`Connector`], so TLS or
//! in-memory streams plug in without touching the state machine.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep_until};
use tracing::{Span, debug, info_span};

use super::config::TransportConfig;
use super::connection::{ConnectionPhase, ConnectionState};
use super::handle::TransportHandle;
use super::packet::{OutgoingQueue, Packet, PendingQueue};
use super::timing::Liveness;
use crate::core::{ConnectionDriver, Transport, TransportError, TransportResult};

/// A connection attempt in flight.
pub type ConnectFuture<S> = Pin<Box<dyn Future<Output = TransportResult<S>> + Send + 'static>>;

/// Opens byte streams to endpoints.
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Start connecting to `endpoint`.
    fn connect(&self, endpoint: SocketAddr) -> ConnectFuture<Self::Stream>;

    /// Local address of an established stream, if it has one.
    fn local_addr(_stream: &Self::Stream) -> Option<SocketAddr> {
        None
    }
}

/// Plain TCP with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, endpoint: SocketAddr) -> ConnectFuture<TcpStream> {
        Box::pin(async move {
            let stream = TcpStream::connect(endpoint).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }

    fn local_addr(stream: &TcpStream) -> Option<SocketAddr> {
        stream.local_addr().ok()
    }
}

/// Bound a connection attempt; expiry yields
/// [`TransportError::ConnectTimeout`].
pub fn with_connect_timeout<S: Send + 'static>(
    connect: ConnectFuture<S>,
    timeout: Duration,
) -> ConnectFuture<S> {
    Box::pin(async move {
        match tokio::time::timeout(timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout),
        }
    })
}

/// Bound used when a cycle's wait does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline `wait` from now. Waits past the clock's range saturate, so
/// `Duration::MAX` means "until woken".
pub(crate) fn cycle_deadline(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait).unwrap_or(now + FAR_FUTURE)
}

struct Halves<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
}

enum Event<S> {
    Connected(TransportResult<S>),
    Read(io::Result<usize>),
    Written(io::Result<usize>),
    Flushed(io::Result<()>),
    Woken,
    Elapsed,
}

/// Transport reacting to stream events.
pub struct StreamTransport<C: Connector> {
    connector: C,
    state: ConnectionState,
    io: Option<Halves<C::Stream>>,
    connecting: Option<ConnectFuture<C::Stream>>,
    /// Bytes were written since the last completed flush.
    flush_due: bool,
}

impl<C: Connector + fmt::Debug> fmt::Debug for StreamTransport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport")
            .field("connector", &self.connector)
            .field("state", &self.state)
            .field("open", &self.io.is_some())
            .field("connecting", &self.connecting.is_some())
            .field("flush_due", &self.flush_due)
            .finish()
    }
}

impl<C: Connector> StreamTransport<C> {
    /// Create a transport with its own outgoing queue.
    pub fn new(connector: C, config: TransportConfig) -> Self {
        Self::with_queue(connector, OutgoingQueue::new(), config)
    }

    /// Create a transport draining an existing queue.
    pub fn with_queue(connector: C, queue: OutgoingQueue, config: TransportConfig) -> Self {
        let span = info_span!("transport", backend = "stream");
        Self {
            connector,
            state: ConnectionState::new(TransportHandle::new(queue), config, span),
            io: None,
            connecting: None,
            flush_due: false,
        }
    }

    /// Record events in `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.state.set_span(span);
        self
    }

    /// The connector streams are opened with.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn drop_stream(&mut self) {
        self.connecting = None;
        self.io = None;
        self.flush_due = false;
    }

    async fn flush(&mut self) -> TransportResult<()> {
        let halves = self.io.as_mut().ok_or(TransportError::NotConnected)?;
        while self.state.has_outbound() {
            let n = halves.writer.write(self.state.outbound_chunk()).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            self.state.on_written(n);
        }
        halves.writer.flush().await?;
        self.flush_due = false;
        Ok(())
    }
}

impl<C: Connector> Transport for StreamTransport<C> {
    fn handle(&self) -> &TransportHandle {
        self.state.handle()
    }

    fn connect(&mut self, endpoint: SocketAddr) -> TransportResult<()> {
        self.state.begin_connect(endpoint)?;
        self.drop_stream();
        let timeout = self.state.config().connect_timeout;
        self.connecting = Some(with_connect_timeout(self.connector.connect(endpoint), timeout));
        Ok(())
    }

    fn phase(&self) -> ConnectionPhase {
        self.state.phase()
    }

    fn cleanup(&mut self) {
        self.drop_stream();
        self.state.reset();
    }

    fn close(&mut self) {
        self.drop_stream();
        if !self.state.is_closed() {
            self.state.mark_closed();
        }
    }

    async fn do_transport<D: ConnectionDriver>(
        &mut self,
        wait: Duration,
        pending: &mut PendingQueue,
        driver: &mut D,
    ) -> TransportResult<()> {
        if self.state.is_closed() {
            return Err(TransportError::Closed);
        }
        let handle = self.state.handle().clone();
        let deadline = cycle_deadline(wait);
        self.state.update_now();
        self.state.move_written(pending);

        loop {
            if handle.is_closing() {
                self.close();
                return Ok(());
            }

            let event = if let Some(connecting) = self.connecting.as_mut() {
                tokio::select! {
                    result = connecting => Event::Connected(result),
                    _ = handle.notified() => Event::Woken,
                    _ = sleep_until(deadline) => Event::Elapsed,
                }
            } else if let Some(Halves { reader, writer }) = self.io.as_mut() {
                self.state.fill_outbound();
                let writing = self.state.has_outbound();
                let flushing = !writing && self.flush_due;
                let (read_buf, outbound) = self.state.io_buffers();
                // Write and flush share the writer; only one of them runs.
                let send = async move {
                    if writing {
                        Event::Written(writer.write(outbound).await)
                    } else {
                        Event::Flushed(writer.flush().await)
                    }
                };
                tokio::select! {
                    read = reader.read_buf(read_buf) => Event::Read(read),
                    event = send, if writing || flushing => event,
                    _ = handle.notified() => Event::Woken,
                    _ = sleep_until(deadline) => Event::Elapsed,
                }
            } else {
                return Err(TransportError::NotConnected);
            };

            self.state.update_now();
            match event {
                Event::Connected(result) => {
                    self.connecting = None;
                    let stream = result?;
                    let local = C::local_addr(&stream);
                    let (reader, writer) = tokio::io::split(stream);
                    self.io = Some(Halves { reader, writer });
                    self.state.on_established(local, driver)?;
                }
                Event::Read(result) => {
                    let n = result?;
                    if n == 0 {
                        return Err(TransportError::ConnectionClosed);
                    }
                    self.state.on_read(n);
                    self.state.process_frames(pending, driver)?;
                    break;
                }
                Event::Written(result) => {
                    let n = result?;
                    if n == 0 {
                        return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                    }
                    self.state.on_written(n);
                    self.flush_due = true;
                    if self.state.has_outbound() {
                        break;
                    }
                }
                Event::Flushed(result) => {
                    result?;
                    self.flush_due = false;
                    break;
                }
                Event::Woken => {}
                Event::Elapsed => break,
            }
        }

        self.state.move_written(pending);
        Ok(())
    }

    async fn send_packet(&mut self, packet: Packet) -> TransportResult<()> {
        if self.io.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.state.push_out_of_band(packet);
        let send_timeout = self.state.config().send_timeout;
        match tokio::time::timeout(send_timeout, self.flush()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(parent: self.state.span(), "out-of-band send timed out");
                Err(io::Error::new(io::ErrorKind::TimedOut, "out-of-band send timed out").into())
            }
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.remote_addr()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.state.local_addr()
    }

    fn liveness(&self) -> &Liveness {
        self.state.liveness()
    }

    fn session_id(&self) -> i64 {
        self.state.session_id()
    }
}
