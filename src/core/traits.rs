//! Contracts between the transport backends and the connection driver.
//!
//! The driver owns the reconnect loop: it picks an endpoint from a
//! [`HostSet`](crate::hosts::HostSet), calls [`Transport::connect`], then
//! spins [`Transport::do_transport`] on one dedicated task, applying its
//! own ping and timeout policy between cycles from the idle durations the
//! transport reports. Producers on other tasks only ever touch the
//! [`TransportHandle`].

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use super::error::TransportResult;
use crate::transport::{ConnectResponse, ConnectionPhase, Liveness, Packet, PendingQueue, TransportHandle};

/// Callbacks a transport makes into the connection driver, always on the
/// I/O task and inside [`Transport::do_transport`].
pub trait ConnectionDriver: Send {
    /// The socket is up. Queue the connect request at the front of the
    /// outgoing queue, plus any priming packets.
    fn prime_connection(&mut self) -> TransportResult<()>;

    /// The connect response was decoded and its session id adopted.
    fn on_connected(&mut self, response: &ConnectResponse) -> TransportResult<()>;

    /// A complete frame arrived after the handshake.
    ///
    /// Replies to requests are matched against the front of `pending`.
    fn read_response(&mut self, frame: Bytes, pending: &mut PendingQueue) -> TransportResult<()>;
}

/// One physical connection to a server, driven by a single I/O task.
///
/// Implementations own their socket and buffers; nothing is shared between
/// backends besides [`ConnectionState`](crate::transport::ConnectionState).
pub trait Transport: Send {
    /// Cross-thread control handle.
    fn handle(&self) -> &TransportHandle;

    /// Start a connection attempt. Completion is observed by later
    /// [`do_transport`](Self::do_transport) cycles.
    fn connect(&mut self, endpoint: SocketAddr) -> TransportResult<()>;

    /// Whether the socket is usable for both directions.
    fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// Current lifecycle phase.
    fn phase(&self) -> ConnectionPhase;

    /// Release the socket and its buffers. Idempotent.
    fn cleanup(&mut self);

    /// Release everything and refuse further connects.
    fn close(&mut self);

    /// Run one bounded unit of I/O work.
    ///
    /// Waits at most `wait` for readiness, a
    /// [`packet_added`](TransportHandle::packet_added) wake-up or
    /// [`on_closing`](TransportHandle::on_closing). Requests whose frames
    /// were fully written are appended to `pending`. Returns `Ok(())`
    /// after a shutdown request; every error is fatal to the connection.
    fn do_transport<D: ConnectionDriver>(
        &mut self,
        wait: Duration,
        pending: &mut PendingQueue,
        driver: &mut D,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    /// Write one packet ahead of the outgoing queue, used for the
    /// authentication exchange while the auth gate is closed.
    fn send_packet(&mut self, packet: Packet) -> impl Future<Output = TransportResult<()>> + Send;

    /// Endpoint of the current or last connection attempt.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Local address of the established socket.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Liveness timestamps and counters.
    fn liveness(&self) -> &Liveness;

    /// Session id adopted from the last connect response.
    fn session_id(&self) -> i64;

    /// Wake the I/O task because work was queued.
    fn packet_added(&self) {
        self.handle().packet_added();
    }

    /// Ask the I/O task to stop.
    fn on_closing(&self) {
        self.handle().on_closing();
    }

    /// Open the authentication gate.
    fn sasl_completed(&self) {
        self.handle().sasl_completed();
    }

    /// Mark session priming as finished.
    fn connection_primed(&self) {
        self.handle().connection_primed();
    }

    /// Packets written since creation.
    fn sent_count(&self) -> u64 {
        self.liveness().sent_count()
    }

    /// Frames received since creation.
    fn recv_count(&self) -> u64 {
        self.liveness().recv_count()
    }

    /// Time since the last read, as of the last cycle.
    fn idle_recv(&self) -> Duration {
        self.liveness().idle_recv()
    }

    /// Time since the last write, as of the last cycle.
    fn idle_send(&self) -> Duration {
        self.liveness().idle_send()
    }
}
