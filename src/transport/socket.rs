//! Readiness-based TCP transport.
//!
//! Each cycle registers interest in the socket (always readable, writable
//! only while frames are waiting), waits for readiness or a wake-up, then
//! performs non-blocking `try_read`/`try_write` calls. This is the
//! selector-loop backend; see [`StreamTransport`](super::StreamTransport)
//! for the event-driven one.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tokio::time::sleep_until;
use tracing::{Span, debug, info_span, trace};

use super::config::TransportConfig;
use super::connection::{ConnectionPhase, ConnectionState};
use super::handle::TransportHandle;
use super::packet::{OutgoingQueue, Packet, PendingQueue};
use super::stream::{ConnectFuture, Connector, TcpConnector, cycle_deadline, with_connect_timeout};
use super::timing::Liveness;
use crate::core::{ConnectionDriver, Transport, TransportError, TransportResult};

/// What ended a cycle's wait.
enum Event {
    Connected(TransportResult<TcpStream>),
    Ready(io::Result<Ready>),
    Woken,
    Elapsed,
}

/// TCP transport driven by socket readiness.
pub struct TcpTransport {
    state: ConnectionState,
    stream: Option<TcpStream>,
    connecting: Option<ConnectFuture<TcpStream>>,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("state", &self.state)
            .field("stream", &self.stream)
            .field("connecting", &self.connecting.is_some())
            .finish()
    }
}

impl TcpTransport {
    /// Create a transport with its own outgoing queue.
    pub fn new(config: TransportConfig) -> Self {
        Self::with_queue(OutgoingQueue::new(), config)
    }

    /// Create a transport draining an existing queue.
    pub fn with_queue(queue: OutgoingQueue, config: TransportConfig) -> Self {
        let span = info_span!("transport", backend = "tcp");
        Self {
            state: ConnectionState::new(TransportHandle::new(queue), config, span),
            stream: None,
            connecting: None,
        }
    }

    /// Record events in `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.state.set_span(span);
        self
    }

    fn drop_socket(&mut self) {
        self.connecting = None;
        if self.stream.take().is_some() {
            trace!(parent: self.state.span(), "socket dropped");
        }
    }

    fn do_read<D: ConnectionDriver>(
        &mut self,
        pending: &mut PendingQueue,
        driver: &mut D,
    ) -> TransportResult<()> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
        match stream.try_read_buf(self.state.read_buf()) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => self.state.on_read(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.state.process_frames(pending, driver)
    }

    fn do_write(&mut self) -> TransportResult<()> {
        self.state.fill_outbound();
        while self.state.has_outbound() {
            let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
            match stream.try_write(self.state.outbound_chunk()) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.state.on_written(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> TransportResult<()> {
        while self.state.has_outbound() {
            let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
            stream.writable().await?;
            match stream.try_write(self.state.outbound_chunk()) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.state.on_written(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn handle(&self) -> &TransportHandle {
        self.state.handle()
    }

    fn connect(&mut self, endpoint: SocketAddr) -> TransportResult<()> {
        self.state.begin_connect(endpoint)?;
        self.drop_socket();
        let timeout = self.state.config().connect_timeout;
        self.connecting = Some(with_connect_timeout(
            TcpConnector.connect(endpoint),
            timeout,
        ));
        Ok(())
    }

    fn phase(&self) -> ConnectionPhase {
        self.state.phase()
    }

    fn cleanup(&mut self) {
        self.drop_socket();
        self.state.reset();
    }

    fn close(&mut self) {
        self.drop_socket();
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
            } else if let Some(stream) = self.stream.as_ref() {
                self.state.fill_outbound();
                let interest = if self.state.has_outbound() {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                tokio::select! {
                    ready = stream.ready(interest) => Event::Ready(ready),
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
                    let local = stream.local_addr().ok();
                    self.stream = Some(stream);
                    self.state.on_established(local, driver)?;
                }
                Event::Ready(ready) => {
                    let ready = ready?;
                    if ready.is_readable() || ready.is_read_closed() {
                        self.do_read(pending, driver)?;
                    }
                    if ready.is_writable() {
                        self.do_write()?;
                    }
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
        if self.stream.is_none() {
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
