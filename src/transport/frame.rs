//! Length-prefixed framing.
//!
//! Wire format:
//! ```text
//! +----------------+---------------------------+
//! | Length         | Payload                   |
//! | 4 bytes (BE32) | `Length` bytes            |
//! +----------------+---------------------------+
//! ```
//! `Length` must satisfy `0 <= Length < max_packet_len`. Anything else is
//! a fatal framing error for the connection; the bound is checked before
//! any payload memory is reserved.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::{FRAME_LENGTH_SIZE, TransportError, TransportResult};

/// Validate a declared payload length against the configured maximum.
pub fn check_length(len: i32, max_packet_len: usize) -> TransportResult<usize> {
    if len < 0 || len as usize >= max_packet_len {
        return Err(TransportError::Framing {
            len: i64::from(len),
            max: max_packet_len,
        });
    }
    Ok(len as usize)
}

/// Append `payload` to `dst` with its length prefix.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(FRAME_LENGTH_SIZE + payload.len());
    dst.put_i32(payload.len() as i32);
    dst.put_slice(payload);
}

/// Incremental frame decoder.
///
/// Bytes arrive in arbitrary chunks; call [`decode`](Self::decode) after
/// every read until it returns `Ok(None)`.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_packet_len: usize,
    /// Payload length of the frame in progress, once its prefix was read.
    expected: Option<usize>,
}

impl FrameDecoder {
    /// Create a decoder rejecting frames of `max_packet_len` bytes or more.
    pub fn new(max_packet_len: usize) -> Self {
        Self {
            max_packet_len,
            expected: None,
        }
    }

    /// Payload length of the frame in progress, if its prefix was read.
    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    /// Forget any partially read frame.
    pub fn reset(&mut self) {
        self.expected = None;
    }

    /// Take the next complete payload out of `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> TransportResult<Option<Bytes>> {
        let len = match self.expected {
            Some(len) => len,
            None => {
                if buf.len() < FRAME_LENGTH_SIZE {
                    return Ok(None);
                }
                let len = check_length(buf.get_i32(), self.max_packet_len)?;
                buf.reserve(len);
                self.expected = Some(len);
                len
            }
        };

        if buf.len() < len {
            return Ok(None);
        }
        self.expected = None;
        Ok(Some(buf.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    fn prefix(len: i32) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(len);
        buf
    }

    #[test]
    fn test_length_bounds() {
        assert!(check_length(MAX as i32, MAX).unwrap_err().is_framing());
        assert!(check_length(-1, MAX).unwrap_err().is_framing());
        assert!(check_length(i32::MIN, MAX).unwrap_err().is_framing());
        assert_eq!(check_length(MAX as i32 - 1, MAX).unwrap(), MAX - 1);
        assert_eq!(check_length(0, MAX).unwrap(), 0);
    }

    #[test]
    fn test_decode_rejects_max_and_negative() {
        let mut decoder = FrameDecoder::new(MAX);
        let err = decoder.decode(&mut prefix(MAX as i32)).unwrap_err();
        assert!(matches!(err, TransportError::Framing { len: 1024, max: 1024 }));

        let mut decoder = FrameDecoder::new(MAX);
        let err = decoder.decode(&mut prefix(-7)).unwrap_err();
        assert!(matches!(err, TransportError::Framing { len: -7, .. }));
    }

    #[test]
    fn test_decode_accepts_max_minus_one() {
        let mut decoder = FrameDecoder::new(MAX);
        let mut buf = prefix(MAX as i32 - 1);
        buf.put_bytes(0xAB, MAX - 1);

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), MAX - 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_chunks() {
        let mut encoded = BytesMut::new();
        encode_frame(b"hello", &mut encoded);
        encode_frame(b"", &mut encoded);
        encode_frame(b"world!", &mut encoded);

        let mut decoder = FrameDecoder::new(MAX);
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        // Feed one byte at a time
        for byte in encoded.iter() {
            buf.put_u8(*byte);
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"hello"),
                Bytes::new(),
                Bytes::from_static(b"world!"),
            ]
        );
        assert_eq!(decoder.expected(), None);
    }

    #[test]
    fn test_decode_waits_for_payload() {
        let mut decoder = FrameDecoder::new(MAX);
        let mut buf = prefix(4);
        buf.put_slice(b"ab");

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(decoder.expected(), Some(4));

        decoder.reset();
        assert_eq!(decoder.expected(), None);
    }

    #[test]
    fn test_encode_wire_layout() {
        let mut buf = BytesMut::new();
        encode_frame(&[0xCA, 0xFE], &mut buf);
        assert_eq!(hex::encode(&buf), "00000002cafe");
    }
}
