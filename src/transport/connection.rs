//! Connection state shared by every socket backend.
//!
//! A backend owns the socket and the waiting; [`ConnectionState`] owns
//! everything else: phase, frame decoding, the handshake, send
//! eligibility, partially written frames and liveness.
//!
//! ```text
//!  Disconnected --connect()--> Connecting --socket up--> HandshakePending
//!        ^                                                     |
//!        |                                            connect response
//!   cleanup()                                                  v
//!        |                                   AuthPending <--> Ready
//!        +------------------------------------------+----------+
//!                     on_closing() / close()  -->  Closed
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{Span, debug, info, trace, warn};

use super::config::TransportConfig;
use super::frame::{FrameDecoder, encode_frame};
use super::handle::TransportHandle;
use super::handshake::ConnectResponse;
use super::packet::{Packet, PacketKind, PendingQueue};
use super::timing::Liveness;
use crate::core::{
    ConnectionDriver, FRAME_LENGTH_SIZE, READ_BUFFER_CAPACITY, TransportError, TransportResult,
};

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// No socket.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Socket up, waiting for the connect response.
    HandshakePending,
    /// Handshake done, authentication gate closed.
    AuthPending,
    /// Handshake done, application traffic flows.
    Ready,
    /// Shut down for good.
    Closed,
}

impl ConnectionPhase {
    /// Whether the socket is usable in both directions.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionPhase::HandshakePending | ConnectionPhase::AuthPending | ConnectionPhase::Ready
        )
    }
}

/// Whether a packet of `kind` may leave the queue right now.
///
/// Only the connect request goes out before the handshake reply; auth
/// traffic follows it; application traffic waits for an open auth gate.
pub fn may_send(kind: PacketKind, handshake_done: bool, auth_pending: bool) -> bool {
    match kind {
        PacketKind::Handshake => true,
        PacketKind::Auth => handshake_done,
        PacketKind::Ping | PacketKind::Request => handshake_done && !auth_pending,
    }
}

/// Encoded frames waiting for the socket, with the packets they carry.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    buf: BytesMut,
    /// Unwritten bytes of each frame, front first.
    frames: VecDeque<(usize, Packet)>,
}

impl OutboundBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame and append a packet.
    pub fn push(&mut self, packet: Packet) {
        encode_frame(packet.body(), &mut self.buf);
        self.frames
            .push_back((FRAME_LENGTH_SIZE + packet.body().len(), packet));
    }

    /// Bytes not yet written.
    pub fn chunk(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered frames, including a partially written one.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is waiting to be written.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Mark `n` bytes as written and return the packets whose frames are
    /// now complete.
    pub fn consume(&mut self, n: usize) -> Vec<Packet> {
        let n = n.min(self.buf.len());
        self.buf.advance(n);

        let mut left = n;
        let mut done = Vec::new();
        while left > 0 {
            let Some(front) = self.frames.front_mut() else {
                break;
            };
            if front.0 <= left {
                left -= front.0;
                if let Some((_, packet)) = self.frames.pop_front() {
                    done.push(packet);
                }
            } else {
                front.0 -= left;
                left = 0;
            }
        }
        done
    }

    /// Drop buffered bytes and hand back every unsent packet in order.
    pub fn take_packets(&mut self) -> Vec<Packet> {
        self.buf.clear();
        self.frames.drain(..).map(|(_, packet)| packet).collect()
    }
}

/// Per-connection bookkeeping, independent of the I/O backend.
#[derive(Debug)]
pub struct ConnectionState {
    handle: TransportHandle,
    config: TransportConfig,
    phase: ConnectionPhase,
    session_id: i64,
    decoder: FrameDecoder,
    read_buf: BytesMut,
    outbound: OutboundBuffer,
    /// Tracked packets written but not yet handed to the driver.
    written: VecDeque<Packet>,
    liveness: Liveness,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    span: Span,
}

impl ConnectionState {
    /// Create a disconnected state.
    pub fn new(handle: TransportHandle, config: TransportConfig, span: Span) -> Self {
        Self {
            decoder: FrameDecoder::new(config.max_packet_len),
            handle,
            config,
            phase: ConnectionPhase::Disconnected,
            session_id: 0,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            outbound: OutboundBuffer::new(),
            written: VecDeque::new(),
            liveness: Liveness::new(),
            remote_addr: None,
            local_addr: None,
            span,
        }
    }

    /// Control handle shared with producers.
    pub fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    /// Transport settings.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Span every event of this connection is recorded in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Replace the tracing span.
    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    /// Current phase, folding in the cross-thread closing and auth flags.
    pub fn phase(&self) -> ConnectionPhase {
        if self.phase == ConnectionPhase::Closed || self.handle.is_closing() {
            return ConnectionPhase::Closed;
        }
        if self.phase == ConnectionPhase::Ready && self.handle.auth_pending() {
            return ConnectionPhase::AuthPending;
        }
        self.phase
    }

    /// Whether [`mark_closed`](Self::mark_closed) already ran.
    pub fn is_closed(&self) -> bool {
        self.phase == ConnectionPhase::Closed
    }

    /// Session id adopted from the last connect response (0 before).
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Liveness timestamps and counters.
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Refresh the cycle clock.
    pub fn update_now(&mut self) {
        self.liveness.update_now();
    }

    /// Endpoint of the current or last attempt.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Local address of the established socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn handshake_done(&self) -> bool {
        self.phase == ConnectionPhase::Ready
    }

    /// Enter `Connecting` for `endpoint`.
    pub fn begin_connect(&mut self, endpoint: SocketAddr) -> TransportResult<()> {
        if self.phase() == ConnectionPhase::Closed {
            return Err(TransportError::Closed);
        }
        self.reset();
        self.phase = ConnectionPhase::Connecting;
        self.remote_addr = Some(endpoint);
        self.handle.reset_connection_flags(self.config.auth_required);
        debug!(parent: &self.span, %endpoint, "initiating connection");
        Ok(())
    }

    /// The socket came up: reset liveness and let the driver prime it.
    pub fn on_established<D: ConnectionDriver>(
        &mut self,
        local_addr: Option<SocketAddr>,
        driver: &mut D,
    ) -> TransportResult<()> {
        self.phase = ConnectionPhase::HandshakePending;
        self.local_addr = local_addr;
        self.liveness.update_now();
        self.liveness.on_send_and_heard();
        debug!(
            parent: &self.span,
            remote = ?self.remote_addr,
            local = ?self.local_addr,
            "socket connected"
        );
        driver.prime_connection()
    }

    /// Buffer the next read lands in, with room for at least one chunk.
    pub fn read_buf(&mut self) -> &mut BytesMut {
        self.read_buf.reserve(READ_BUFFER_CAPACITY);
        &mut self.read_buf
    }

    /// Read buffer and unwritten bytes, borrowed together.
    pub fn io_buffers(&mut self) -> (&mut BytesMut, &[u8]) {
        self.read_buf.reserve(READ_BUFFER_CAPACITY);
        (&mut self.read_buf, self.outbound.chunk())
    }

    /// `n` bytes arrived.
    pub fn on_read(&mut self, n: usize) {
        trace!(parent: &self.span, bytes = n, "read");
        self.liveness.on_heard();
    }

    /// Decode and dispatch every complete frame in the read buffer.
    ///
    /// The first frame after connecting is the connect response; the rest
    /// go to the driver as they are.
    pub fn process_frames<D: ConnectionDriver>(
        &mut self,
        pending: &mut PendingQueue,
        driver: &mut D,
    ) -> TransportResult<()> {
        loop {
            let frame = match self.decoder.decode(&mut self.read_buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(parent: &self.span, remote = ?self.remote_addr, error = %e, "framing violation");
                    return Err(e);
                }
            };
            self.liveness.record_received();

            if self.phase == ConnectionPhase::HandshakePending {
                self.on_connect_response(&frame, driver)?;
            } else {
                driver.read_response(frame, pending)?;
            }
        }
    }

    fn on_connect_response<D: ConnectionDriver>(
        &mut self,
        frame: &Bytes,
        driver: &mut D,
    ) -> TransportResult<()> {
        let response = ConnectResponse::decode(frame)?;
        if !response.has_read_only_flag {
            warn!(
                parent: &self.span,
                remote = ?self.remote_addr,
                "connected to a server without read-only support"
            );
        }

        self.session_id = response.session_id;
        self.phase = ConnectionPhase::Ready;
        info!(
            parent: &self.span,
            session_id = %format!("{:#x}", response.session_id),
            timeout_ms = response.timeout_ms,
            read_only = response.read_only,
            "session established"
        );
        driver.on_connected(&response)
    }

    /// Move eligible packets from the outgoing queue into the outbound
    /// buffer, up to the drain limit.
    pub fn fill_outbound(&mut self) {
        let handshake_done = self.handshake_done();
        let auth_pending = self.handle.auth_pending();
        let allowed = |kind| may_send(kind, handshake_done, auth_pending);

        while self.outbound.len() < self.config.drain_limit {
            let Some(packet) = self.handle.queue().pop_sendable(allowed) else {
                break;
            };
            trace!(parent: &self.span, kind = ?packet.kind(), xid = packet.xid(), "dequeued");
            self.outbound.push(packet);
        }
    }

    /// Frame a packet behind what is already buffered, skipping the queue.
    pub fn push_out_of_band(&mut self, packet: Packet) {
        trace!(parent: &self.span, kind = ?packet.kind(), xid = packet.xid(), "out-of-band send");
        self.outbound.push(packet);
    }

    /// Whether the outbound buffer holds unwritten bytes.
    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Unwritten bytes.
    pub fn outbound_chunk(&self) -> &[u8] {
        self.outbound.chunk()
    }

    /// `n` bytes left the socket.
    pub fn on_written(&mut self, n: usize) {
        self.liveness.on_send();
        for packet in self.outbound.consume(n) {
            self.liveness.record_sent();
            if packet.kind().tracks_response() {
                self.written.push_back(packet);
            }
        }
    }

    /// Hand fully written requests to the driver's pending queue.
    pub fn move_written(&mut self, pending: &mut PendingQueue) {
        pending.extend(self.written.drain(..));
    }

    /// Forget the current socket.
    ///
    /// Unsent packets go back to the head of the outgoing queue. Connect
    /// requests are discarded instead; the next connection primes its own.
    pub fn reset(&mut self) {
        let mut unsent = self.outbound.take_packets();
        unsent.retain(|p| p.kind() != PacketKind::Handshake);
        let requeued = unsent.len();
        self.handle.queue().requeue_front(unsent);
        let stale = self.handle.queue().purge(PacketKind::Handshake).len();

        for packet in self.written.drain(..) {
            packet.complete(Err(TransportError::ConnectionClosed));
        }

        self.decoder.reset();
        self.read_buf.clear();
        self.local_addr = None;
        if self.phase != ConnectionPhase::Closed {
            self.phase = ConnectionPhase::Disconnected;
        }
        if requeued > 0 || stale > 0 {
            debug!(parent: &self.span, requeued, stale, "connection reset");
        }
    }

    /// Enter `Closed` for good.
    pub fn mark_closed(&mut self) {
        self.reset();
        self.phase = ConnectionPhase::Closed;
        debug!(parent: &self.span, "transport closed");
    }
}
