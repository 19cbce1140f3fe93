//! Test doubles shared by the transport tests.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

use super::frame::encode_frame;
use super::handle::TransportHandle;
use super::handshake::{ConnectRequest, ConnectResponse, SessionSecret};
use super::packet::PendingQueue;
use super::stream::{ConnectFuture, Connector};
use crate::core::{ConnectionDriver, Transport, TransportError, TransportResult};

/// Driver that primes a new session and records everything it is told.
pub(crate) struct RecordingDriver {
    handle: TransportHandle,
    pub request: ConnectRequest,
    pub primed: usize,
    pub connected: Vec<ConnectResponse>,
    /// `(xid, reply)` for every reply matched against the pending queue.
    pub replies: Vec<(i32, Bytes)>,
}

impl RecordingDriver {
    pub fn new(handle: TransportHandle) -> Self {
        Self {
            handle,
            request: ConnectRequest::new_session(Duration::from_secs(30), false),
            primed: 0,
            connected: Vec::new(),
            replies: Vec::new(),
        }
    }
}

impl ConnectionDriver for RecordingDriver {
    fn prime_connection(&mut self) -> TransportResult<()> {
        self.primed += 1;
        self.handle.queue().push_front(self.request.clone().into_packet());
        Ok(())
    }

    fn on_connected(&mut self, response: &ConnectResponse) -> TransportResult<()> {
        self.connected.push(response.clone());
        Ok(())
    }

    fn read_response(&mut self, frame: Bytes, pending: &mut PendingQueue) -> TransportResult<()> {
        let packet = pending
            .pop_front()
            .ok_or_else(|| TransportError::Driver("reply without a pending request".into()))?;
        self.replies.push((packet.xid(), frame.clone()));
        packet.complete(Ok(frame));
        Ok(())
    }
}

/// Connector handing out one end of a single in-memory pipe.
pub(crate) struct DuplexConnector {
    client: Mutex<Option<DuplexStream>>,
}

impl DuplexConnector {
    /// The connector plus the server end of its pipe.
    pub fn pair() -> (Self, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let connector = Self {
            client: Mutex::new(Some(client)),
        };
        (connector, server)
    }
}

impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    fn connect(&self, _endpoint: SocketAddr) -> ConnectFuture<DuplexStream> {
        let stream = self.client.lock().take();
        Box::pin(async move {
            stream.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused).into())
        })
    }
}

/// Connect response as a server sends it.
pub(crate) fn connect_response(has_read_only_flag: bool) -> Bytes {
    ConnectResponse {
        protocol_version: 0,
        timeout_ms: 30_000,
        session_id: 0xABCD,
        session_secret: SessionSecret::new(vec![9; 16]),
        read_only: false,
        has_read_only_flag,
    }
    .encode()
}

/// Read one length-prefixed frame on the server side.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Bytes> {
    let len = reader.read_i32().await?;
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload.into())
}

/// Write one length-prefixed frame on the server side.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Run short cycles until `done` holds, an error surfaces, or five
/// seconds pass.
pub(crate) async fn drive_until<T, F>(
    transport: &mut T,
    driver: &mut RecordingDriver,
    pending: &mut PendingQueue,
    mut done: F,
) -> TransportResult<()>
where
    T: Transport,
    F: FnMut(&T, &RecordingDriver) -> bool,
{
    let cycles = async {
        while !done(transport, driver) {
            transport
                .do_transport(Duration::from_millis(50), pending, driver)
                .await?;
        }
        Ok::<(), TransportError>(())
    };
    match tokio::time::timeout(Duration::from_secs(5), cycles).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "condition not reached").into()),
    }
}
