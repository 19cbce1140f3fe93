//! Transport layer: one physical connection to an ensemble member.
//!
//! This module provides:
//!
//! - **Framing**: [`FrameDecoder`] and [`encode_frame`] for the 4-byte
//!   big-endian length prefix, with a bounded maximum frame size
//! - **Handshake**: [`ConnectRequest`] / [`ConnectResponse`], tolerating
//!   servers that omit the trailing read-only flag
//! - **Queueing**: [`Packet`], [`OutgoingQueue`] and the cross-thread
//!   [`TransportHandle`]
//! - **State machine**: [`ConnectionState`] with the auth gate, send
//!   eligibility and [`Liveness`] bookkeeping
//! - **Backends**: [`TcpTransport`] (readiness driven) and
//!   [`StreamTransport`] (event driven, any [`Connector`])
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  producers ──submit()──► OutgoingQueue    │
//! │                 packet_added() / closing  │
//! ├───────────────────────────────────────────┤
//! │  I/O task: do_transport() loop            │  ← This module
//! │   frames, handshake, auth gate, liveness  │
//! ├───────────────────────────────────────────┤
//! │  ConnectionDriver: replies, pings, policy │
//! ├───────────────────────────────────────────┤
//! │                  TCP                      │
//! └───────────────────────────────────────────┘
//! ```

mod config;
mod connection;
mod frame;
mod handle;
mod handshake;
mod packet;
mod socket;
mod stream;
mod timing;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{TransportConfig, TransportConfigBuilder};
pub use connection::{ConnectionPhase, ConnectionState, OutboundBuffer, may_send};
pub use frame::{FrameDecoder, check_length, encode_frame};
pub use handle::TransportHandle;
pub use handshake::{ConnectRequest, ConnectResponse, SessionSecret};
pub use packet::{Callback, OutgoingQueue, Packet, PacketKind, PendingQueue};
pub use socket::TcpTransport;
pub use stream::{ConnectFuture, Connector, StreamTransport, TcpConnector, with_connect_timeout};
pub use timing::Liveness;
