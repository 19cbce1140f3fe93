//! Outbound units of work and the queue producers share with the transport.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::core::TransportResult;

/// Completion callback carried by a packet.
pub type Callback = Box<dyn FnOnce(TransportResult<Bytes>) + Send + 'static>;

/// Packets that were written and are waiting for a reply, in send order.
///
/// Owned by the connection driver; the transport only appends to it.
pub type PendingQueue = VecDeque<Packet>;

/// Traffic class of a packet, deciding when it may leave the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Connect request; the only traffic allowed before the handshake reply.
    Handshake,
    /// Authentication exchange; allowed while the auth gate is closed.
    Auth,
    /// Keep-alive; application class, reply routed by well-known xid.
    Ping,
    /// Application request; tracked in the pending queue after sending.
    Request,
}

impl PacketKind {
    /// Whether the driver must match a reply against the pending queue.
    pub fn tracks_response(self) -> bool {
        matches!(self, PacketKind::Request)
    }

    /// Whether the packet is application traffic held by the auth gate.
    pub fn is_application(self) -> bool {
        matches!(self, PacketKind::Ping | PacketKind::Request)
    }
}

/// An opaque unit of outbound work: a serialized request body plus an
/// optional completion callback.
///
/// The body excludes the length prefix; the transport frames it on write.
pub struct Packet {
    kind: PacketKind,
    xid: i32,
    body: Bytes,
    callback: Option<Callback>,
}

impl Packet {
    /// Create a packet of the given kind.
    pub fn new(kind: PacketKind, xid: i32, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            xid,
            body: body.into(),
            callback: None,
        }
    }

    /// Create a connect request packet.
    pub fn handshake(body: impl Into<Bytes>) -> Self {
        Self::new(PacketKind::Handshake, 0, body)
    }

    /// Create an authentication packet.
    pub fn auth(xid: i32, body: impl Into<Bytes>) -> Self {
        Self::new(PacketKind::Auth, xid, body)
    }

    /// Create a keep-alive packet.
    pub fn ping(xid: i32, body: impl Into<Bytes>) -> Self {
        Self::new(PacketKind::Ping, xid, body)
    }

    /// Create an application request packet.
    pub fn request(xid: i32, body: impl Into<Bytes>) -> Self {
        Self::new(PacketKind::Request, xid, body)
    }

    /// Attach a completion callback.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(TransportResult<Bytes>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Traffic class.
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Transaction id assigned by the driver.
    pub fn xid(&self) -> i32 {
        self.xid
    }

    /// Serialized body, without the length prefix.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Run the completion callback, if any.
    pub fn complete(mut self, result: TransportResult<Bytes>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("kind", &self.kind)
            .field("xid", &self.xid)
            .field("len", &self.body.len())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Multi-producer, single-consumer FIFO of outbound packets.
///
/// Cloning yields another handle to the same queue. Appends are serialized
/// by the queue lock, so the consumer observes global enqueue order.
#[derive(Debug, Clone, Default)]
pub struct OutgoingQueue {
    inner: Arc<Mutex<VecDeque<Packet>>>,
}

impl OutgoingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet.
    pub fn push_back(&self, packet: Packet) {
        self.inner.lock().push_back(packet);
    }

    /// Put a packet ahead of everything queued (connect request priming).
    pub fn push_front(&self, packet: Packet) {
        self.inner.lock().push_front(packet);
    }

    /// Return packets to the head of the queue, keeping their order.
    pub fn requeue_front(&self, packets: Vec<Packet>) {
        let mut queue = self.inner.lock();
        for packet in packets.into_iter().rev() {
            queue.push_front(packet);
        }
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Remove the first packet whose kind is allowed to leave.
    ///
    /// Packets of a blocked kind are skipped, never reordered among
    /// themselves.
    pub fn pop_sendable<F>(&self, mut allowed: F) -> Option<Packet>
    where
        F: FnMut(PacketKind) -> bool,
    {
        let mut queue = self.inner.lock();
        let idx = queue.iter().position(|p| allowed(p.kind))?;
        queue.remove(idx)
    }

    /// Whether any queued packet is allowed to leave.
    pub fn has_sendable<F>(&self, mut allowed: F) -> bool
    where
        F: FnMut(PacketKind) -> bool,
    {
        self.inner.lock().iter().any(|p| allowed(p.kind))
    }

    /// Take every queued packet, e.g. to fail them on session loss.
    pub fn drain(&self) -> Vec<Packet> {
        self.inner.lock().drain(..).collect()
    }

    /// Remove every queued packet of the given kind, keeping the rest in
    /// order.
    pub fn purge(&self, kind: PacketKind) -> Vec<Packet> {
        let mut queue = self.inner.lock();
        let (purged, kept): (VecDeque<_>, VecDeque<_>) =
            queue.drain(..).partition(|p| p.kind == kind);
        *queue = kept;
        purged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = OutgoingQueue::new();
        for xid in 1..=3 {
            queue.push_back(Packet::request(xid, vec![xid as u8]));
        }
        let xids: Vec<_> = queue.drain().iter().map(Packet::xid).collect();
        assert_eq!(xids, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_sendable_skips_blocked_kinds() {
        let queue = OutgoingQueue::new();
        queue.push_back(Packet::request(1, "a"));
        queue.push_back(Packet::request(2, "b"));
        queue.push_back(Packet::auth(-4, "auth"));

        let auth_only = |kind: PacketKind| kind == PacketKind::Auth;
        assert!(queue.has_sendable(auth_only));
        let packet = queue.pop_sendable(auth_only).unwrap();
        assert_eq!(packet.kind(), PacketKind::Auth);
        assert!(queue.pop_sendable(auth_only).is_none());

        // Application packets untouched and in order
        let packet = queue.pop_sendable(|_| true).unwrap();
        assert_eq!(packet.xid(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_push_front_and_requeue() {
        let queue = OutgoingQueue::new();
        queue.push_back(Packet::request(3, "c"));
        queue.requeue_front(vec![Packet::request(1, "a"), Packet::request(2, "b")]);
        queue.push_front(Packet::handshake("connect"));

        let packets = queue.drain();
        assert_eq!(packets[0].kind(), PacketKind::Handshake);
        let xids: Vec<_> = packets[1..].iter().map(Packet::xid).collect();
        assert_eq!(xids, vec![1, 2, 3]);
    }

    #[test]
    fn test_purge_by_kind() {
        let queue = OutgoingQueue::new();
        queue.push_back(Packet::handshake("stale"));
        queue.push_back(Packet::request(1, "a"));
        queue.push_back(Packet::handshake("stale"));
        queue.push_back(Packet::request(2, "b"));

        assert_eq!(queue.purge(PacketKind::Handshake).len(), 2);
        let xids: Vec<_> = queue.drain().iter().map(Packet::xid).collect();
        assert_eq!(xids, vec![1, 2]);
    }

    #[test]
    fn test_callback_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let packet = Packet::request(7, "x").with_callback(move |result| {
            assert_eq!(result.unwrap(), Bytes::from_static(b"reply"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(format!("{packet:?}").contains("callback: true"));
        packet.complete(Ok(Bytes::from_static(b"reply")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let queue = OutgoingQueue::new();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.push_back(Packet::request(p * 1000 + i, Bytes::new()));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let packets = queue.drain();
        assert_eq!(packets.len(), 1000);
        for p in 0..4 {
            let xids: Vec<_> = packets
                .iter()
                .map(Packet::xid)
                .filter(|xid| xid / 1000 == p)
                .collect();
            assert!(xids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_kind_classes() {
        assert!(PacketKind::Request.tracks_response());
        assert!(!PacketKind::Ping.tracks_response());
        assert!(!PacketKind::Auth.tracks_response());
        assert!(PacketKind::Ping.is_application());
        assert!(!PacketKind::Handshake.is_application());
    }
}
