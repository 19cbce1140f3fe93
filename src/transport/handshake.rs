//! Connect handshake structures.
//!
//! The first frame a client writes on a fresh socket is a
//! [`ConnectRequest`]; the first frame it reads back is a
//! [`ConnectResponse`]. All integers are big-endian; the session secret is
//! an `int32` length followed by that many bytes (`-1` for none).
//!
//! ```text
//! ConnectResponse
//! +----------+-----------+-----------+------------------+-----------+
//! | version  | timeout   | sessionId | secret           | readOnly  |
//! | i32      | i32 (ms)  | i64       | i32 len + bytes  | u8, opt.  |
//! +----------+-----------+-----------+------------------+-----------+
//! ```
//!
//! Servers predating read-only mode omit the trailing flag.

use std::fmt;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use zeroize::Zeroizing;

use super::packet::Packet;
use crate::core::{DecodeError, PROTOCOL_VERSION, SESSION_SECRET_LEN};

/// Session password issued by the server. Wiped from memory on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionSecret(Zeroizing<Vec<u8>>);

impl SessionSecret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// The all-zero secret a brand new session connects with.
    pub fn empty() -> Self {
        Self::new(vec![0u8; SESSION_SECRET_LEN])
    }

    /// Secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionSecret([redacted; {}])", self.0.len())
    }
}

/// First request on every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Client protocol version.
    pub protocol_version: i32,
    /// Last transaction id the client has seen (0 for a new session).
    pub last_zxid_seen: i64,
    /// Requested session timeout in milliseconds.
    pub timeout_ms: i32,
    /// Session to resume (0 for a new session).
    pub session_id: i64,
    /// Secret of the session to resume.
    pub session_secret: SessionSecret,
    /// Whether the client accepts a read-only server.
    pub read_only: bool,
}

impl ConnectRequest {
    /// Request for a brand new session.
    pub fn new_session(timeout: Duration, read_only: bool) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            last_zxid_seen: 0,
            timeout_ms: timeout.as_millis().min(i32::MAX as u128) as i32,
            session_id: 0,
            session_secret: SessionSecret::empty(),
            read_only,
        }
    }

    /// Serialize the request body (without the frame prefix).
    pub fn encode(&self) -> Bytes {
        let secret = self.session_secret.as_bytes();
        let mut buf = BytesMut::with_capacity(4 + 8 + 4 + 8 + 4 + secret.len() + 1);
        buf.put_i32(self.protocol_version);
        buf.put_i64(self.last_zxid_seen);
        buf.put_i32(self.timeout_ms);
        buf.put_i64(self.session_id);
        buf.put_i32(secret.len() as i32);
        buf.put_slice(secret);
        buf.put_u8(u8::from(self.read_only));
        buf.freeze()
    }

    /// Serialize into a handshake packet.
    pub fn into_packet(self) -> Packet {
        Packet::handshake(self.encode())
    }
}

/// Server reply to [`ConnectRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Server protocol version.
    pub protocol_version: i32,
    /// Session timeout the server agreed to, in milliseconds.
    pub timeout_ms: i32,
    /// Session identity assigned by the server.
    pub session_id: i64,
    /// Session secret for later reconnects.
    pub session_secret: SessionSecret,
    /// Whether the server is in read-only mode.
    pub read_only: bool,
    /// Whether the read-only flag was on the wire at all.
    pub has_read_only_flag: bool,
}

impl ConnectResponse {
    /// Negotiated session timeout.
    pub fn negotiated_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(0) as u64)
    }

    /// Decode a response payload.
    ///
    /// A missing trailing read-only flag decodes as `false` with
    /// `has_read_only_flag` unset. Bytes after the flag are ignored.
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let buf = &mut payload;
        let protocol_version = get_i32(buf, "protocolVersion")?;
        let timeout_ms = get_i32(buf, "timeOut")?;
        let session_id = get_i64(buf, "sessionId")?;
        let session_secret = SessionSecret::new(get_buffer(buf, "passwd")?);

        let (read_only, has_read_only_flag) = if buf.has_remaining() {
            (buf.get_u8() != 0, true)
        } else {
            (false, false)
        };

        Ok(Self {
            protocol_version,
            timeout_ms,
            session_id,
            session_secret,
            read_only,
            has_read_only_flag,
        })
    }

    /// Serialize the response body; the flag is written only if
    /// `has_read_only_flag` is set.
    pub fn encode(&self) -> Bytes {
        let secret = self.session_secret.as_bytes();
        let mut buf = BytesMut::with_capacity(4 + 4 + 8 + 4 + secret.len() + 1);
        buf.put_i32(self.protocol_version);
        buf.put_i32(self.timeout_ms);
        buf.put_i64(self.session_id);
        buf.put_i32(secret.len() as i32);
        buf.put_slice(secret);
        if self.has_read_only_flag {
            buf.put_u8(u8::from(self.read_only));
        }
        buf.freeze()
    }
}

fn get_i32(buf: &mut &[u8], field: &'static str) -> Result<i32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::UnexpectedEof { field });
    }
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut &[u8], field: &'static str) -> Result<i64, DecodeError> {
    if buf.remaining() < 8 {
        return Err(DecodeError::UnexpectedEof { field });
    }
    Ok(buf.get_i64())
}

fn get_buffer(buf: &mut &[u8], field: &'static str) -> Result<Vec<u8>, DecodeError> {
    let len = get_i32(buf, field)?;
    if len == -1 {
        return Ok(Vec::new());
    }
    if len < -1 {
        return Err(DecodeError::InvalidLength { field, len });
    }
    if buf.remaining() < len as usize {
        return Err(DecodeError::UnexpectedEof { field });
    }
    let bytes = buf[..len as usize].to_vec();
    buf.advance(len as usize);
    Ok(bytes)
}
