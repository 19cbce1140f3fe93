//! Minimal connection driver: session resumption, keep-alive pings and
//! reply routing by well-known xid.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ensemble_link::prelude::*;
use ensemble_link::transport::SessionSecret;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Xid the server echoes on ping replies.
pub const PING_XID: i32 = -2;
/// Xid of server-pushed watch notifications.
pub const NOTIFICATION_XID: i32 = -1;
/// Xid of authentication replies.
pub const AUTH_XID: i32 = -4;
/// Opcode of a ping request.
const OP_PING: i32 = 11;

/// Reasons the driver gives up on a connection.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The server refused to resume the session.
    #[error("session {0:#x} expired")]
    SessionExpired(i64),

    /// A reply was shorter than its header.
    #[error("truncated reply header ({0} bytes)")]
    TruncatedReply(usize),
}

impl From<ProbeError> for TransportError {
    fn from(e: ProbeError) -> Self {
        TransportError::Driver(e.to_string())
    }
}

/// Header in front of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: i32,
    pub zxid: i64,
    pub err: i32,
}

impl ReplyHeader {
    const LEN: usize = 4 + 8 + 4;

    fn decode(frame: &Bytes) -> Result<Self, ProbeError> {
        if frame.len() < Self::LEN {
            return Err(ProbeError::TruncatedReply(frame.len()));
        }
        let mut buf = &frame[..];
        Ok(Self {
            xid: buf.get_i32(),
            zxid: buf.get_i64(),
            err: buf.get_i32(),
        })
    }
}

/// Session-level state carried across reconnects.
#[derive(Debug)]
pub struct ProbeDriver {
    handle: TransportHandle,
    requested_timeout: Duration,
    read_only: bool,
    session_id: i64,
    secret: SessionSecret,
    last_zxid: i64,
    negotiated: Option<Duration>,
    pings_answered: u64,
}

impl ProbeDriver {
    pub fn new(handle: TransportHandle, requested_timeout: Duration, read_only: bool) -> Self {
        Self {
            handle,
            requested_timeout,
            read_only,
            session_id: 0,
            secret: SessionSecret::empty(),
            last_zxid: 0,
            negotiated: None,
            pings_answered: 0,
        }
    }

    /// Negotiated timeout of the live connection, if the handshake finished.
    pub fn negotiated_timeout(&self) -> Option<Duration> {
        self.negotiated
    }

    /// Ping replies received so far.
    pub fn pings_answered(&self) -> u64 {
        self.pings_answered
    }

    /// Forget the negotiated timeout; the session itself survives.
    pub fn on_disconnected(&mut self) {
        self.negotiated = None;
    }

    /// Queue a keep-alive.
    pub fn send_ping(&self) {
        let mut body = BytesMut::with_capacity(8);
        body.put_i32(PING_XID);
        body.put_i32(OP_PING);
        self.handle.submit(Packet::ping(PING_XID, body.freeze()));
    }
}

impl ConnectionDriver for ProbeDriver {
    fn prime_connection(&mut self) -> TransportResult<()> {
        let mut request = ConnectRequest::new_session(self.requested_timeout, self.read_only);
        request.session_id = self.session_id;
        request.session_secret = self.secret.clone();
        request.last_zxid_seen = self.last_zxid;
        debug!(session_id = %format!("{:#x}", self.session_id), "priming connection");
        self.handle.queue().push_front(request.into_packet());
        Ok(())
    }

    fn on_connected(&mut self, response: &ConnectResponse) -> TransportResult<()> {
        if response.timeout_ms <= 0 {
            let expired = self.session_id;
            self.session_id = 0;
            self.secret = SessionSecret::empty();
            return Err(ProbeError::SessionExpired(expired).into());
        }
        self.session_id = response.session_id;
        self.secret = response.session_secret.clone();
        self.negotiated = Some(response.negotiated_timeout());
        self.handle.connection_primed();
        info!(
            timeout_ms = response.timeout_ms,
            read_only = response.read_only,
            "session ready"
        );
        Ok(())
    }

    fn read_response(&mut self, frame: Bytes, pending: &mut PendingQueue) -> TransportResult<()> {
        let header = ReplyHeader::decode(&frame)?;
        if header.zxid > 0 {
            self.last_zxid = header.zxid;
        }
        match header.xid {
            PING_XID => {
                self.pings_answered += 1;
                trace!("ping reply");
            }
            NOTIFICATION_XID => debug!(len = frame.len(), "notification"),
            AUTH_XID => {
                debug!(err = header.err, "auth reply");
                self.handle.sasl_completed();
            }
            xid => match pending.pop_front() {
                Some(packet) if packet.xid() == xid => packet.complete(Ok(frame)),
                Some(packet) => {
                    let expected = packet.xid();
                    packet.complete(Err(TransportError::Driver(format!(
                        "reply xid {xid} out of order"
                    ))));
                    return Err(TransportError::Driver(format!(
                        "expected reply xid {expected}, got {xid}"
                    )));
                }
                None => {
                    return Err(TransportError::Driver(format!(
                        "reply xid {xid} without a pending request"
                    )));
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(xid: i32, zxid: i64) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_i32(xid);
        buf.put_i64(zxid);
        buf.put_i32(0);
        buf.freeze()
    }

    fn driver() -> ProbeDriver {
        let handle = TransportHandle::new(OutgoingQueue::new());
        ProbeDriver::new(handle, Duration::from_secs(30), false)
    }

    #[test]
    fn test_ping_reply_counts() {
        let mut driver = driver();
        let mut pending = PendingQueue::new();
        driver.read_response(reply(PING_XID, 0), &mut pending).unwrap();
        assert_eq!(driver.pings_answered(), 1);
    }

    #[test]
    fn test_reply_tracks_zxid_and_pending() {
        let mut driver = driver();
        let mut pending = PendingQueue::new();
        pending.push_back(Packet::request(1, "x"));
        driver.read_response(reply(1, 42), &mut pending).unwrap();
        assert!(pending.is_empty());
        assert_eq!(driver.last_zxid, 42);

        assert!(driver.read_response(reply(2, 43), &mut pending).is_err());
    }

    #[test]
    fn test_truncated_reply_rejected() {
        let mut driver = driver();
        let mut pending = PendingQueue::new();
        let err = driver
            .read_response(Bytes::from_static(&[0, 0]), &mut pending)
            .unwrap_err();
        assert!(matches!(err, TransportError::Driver(_)));
    }

    #[test]
    fn test_expired_session_resets_identity() {
        let mut driver = driver();
        driver.session_id = 7;
        let response = ConnectResponse {
            protocol_version: 0,
            timeout_ms: 0,
            session_id: 0,
            session_secret: SessionSecret::empty(),
            read_only: false,
            has_read_only_flag: true,
        };
        assert!(driver.on_connected(&response).is_err());
        assert_eq!(driver.session_id, 0);
    }

    #[test]
    fn test_prime_resumes_session() {
        let mut driver = driver();
        driver.session_id = 0x55;
        driver.prime_connection().unwrap();
        let packet = driver.handle.queue().drain().remove(0);
        assert_eq!(packet.kind(), PacketKind::Handshake);
        // protocol version, last zxid, timeout, then session id
        assert_eq!(&packet.body()[16..24], &0x55i64.to_be_bytes());
    }
}
