//! Cross-thread control surface of a transport.
//!
//! The I/O task owns the transport mutably while it sits in
//! `do_transport`. Everything another thread may need to tell it goes
//! through a cloned [`TransportHandle`]: new work, shutdown, auth completion
//! and priming.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use super::packet::{OutgoingQueue, Packet};

#[derive(Debug, Default)]
struct Signals {
    notify: Notify,
    closing: AtomicBool,
    auth_pending: AtomicBool,
    primed: AtomicBool,
}

/// Cloneable handle for producers and the session layer.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    queue: OutgoingQueue,
    signals: Arc<Signals>,
}

impl TransportHandle {
    /// Create a handle around the queue shared with producers.
    pub fn new(queue: OutgoingQueue) -> Self {
        Self {
            queue,
            signals: Arc::new(Signals::default()),
        }
    }

    /// The outgoing queue this transport drains.
    pub fn queue(&self) -> &OutgoingQueue {
        &self.queue
    }

    /// Append a packet and wake the I/O task.
    pub fn submit(&self, packet: Packet) {
        self.queue.push_back(packet);
        self.packet_added();
    }

    /// Wake the I/O task because new work was queued.
    ///
    /// If no cycle is waiting the wake-up is kept, so the next wait
    /// returns immediately.
    pub fn packet_added(&self) {
        self.signals.notify.notify_one();
    }

    /// Ask the transport to stop; terminates the current or next wait.
    pub fn on_closing(&self) {
        self.signals.closing.store(true, Ordering::SeqCst);
        self.signals.notify.notify_one();
    }

    /// Whether shutdown was requested.
    pub fn is_closing(&self) -> bool {
        self.signals.closing.load(Ordering::SeqCst)
    }

    /// Close the authentication gate: application packets stay queued.
    pub fn begin_auth(&self) {
        self.signals.auth_pending.store(true, Ordering::SeqCst);
    }

    /// Open the authentication gate and wake the I/O task.
    pub fn sasl_completed(&self) {
        self.signals.auth_pending.store(false, Ordering::SeqCst);
        self.signals.notify.notify_one();
    }

    /// Whether an authentication exchange is outstanding.
    pub fn auth_pending(&self) -> bool {
        self.signals.auth_pending.load(Ordering::SeqCst)
    }

    /// Mark post-handshake session priming as finished.
    pub fn connection_primed(&self) {
        self.signals.primed.store(true, Ordering::SeqCst);
        self.signals.notify.notify_one();
    }

    /// Whether session priming finished on the current connection.
    pub fn is_primed(&self) -> bool {
        self.signals.primed.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_connection_flags(&self, auth_required: bool) {
        self.signals.primed.store(false, Ordering::SeqCst);
        self.signals.auth_pending.store(auth_required, Ordering::SeqCst);
    }

    pub(crate) async fn notified(&self) {
        self.signals.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_packet_added_before_wait_is_kept() {
        let handle = TransportHandle::new(OutgoingQueue::new());
        handle.packet_added();

        tokio::time::timeout(Duration::from_millis(100), handle.notified())
            .await
            .expect("stored wake-up should complete the wait");
    }

    #[tokio::test]
    async fn test_closing_wakes_waiter() {
        let handle = TransportHandle::new(OutgoingQueue::new());
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.notified().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.on_closing();

        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter should finish promptly")
            .unwrap();
        assert!(handle.is_closing());
    }

    #[test]
    fn test_auth_gate_flags() {
        let handle = TransportHandle::new(OutgoingQueue::new());
        assert!(!handle.auth_pending());

        handle.reset_connection_flags(true);
        assert!(handle.auth_pending());
        handle.sasl_completed();
        assert!(!handle.auth_pending());

        handle.connection_primed();
        assert!(handle.is_primed());
        handle.reset_connection_flags(false);
        assert!(!handle.is_primed());
    }

    #[test]
    fn test_submit_queues() {
        let handle = TransportHandle::new(OutgoingQueue::new());
        handle.submit(Packet::request(1, "x"));
        assert_eq!(handle.queue().len(), 1);
    }
}
