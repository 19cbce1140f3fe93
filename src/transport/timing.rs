//! Liveness timing and traffic counters.
//!
//! The transport only measures; deciding when to ping or give up on a
//! silent server is the connection driver's job.

use std::time::{Duration, Instant};

/// Monotonic send/receive timestamps plus cumulative counters.
///
/// `now` is refreshed once per transport cycle so every idle computation in
/// that cycle sees the same instant.
#[derive(Debug, Clone)]
pub struct Liveness {
    now: Instant,
    last_send: Instant,
    last_heard: Instant,
    sent_count: u64,
    recv_count: u64,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Create a tracker with every timestamp at the current instant.
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// Create a tracker with every timestamp at `start`.
    pub fn with_start(start: Instant) -> Self {
        Self {
            now: start,
            last_send: start,
            last_heard: start,
            sent_count: 0,
            recv_count: 0,
        }
    }

    /// Refresh the cycle clock.
    pub fn update_now(&mut self) {
        self.update_now_to(Instant::now());
    }

    /// Refresh the cycle clock to an explicit instant (never backwards).
    pub fn update_now_to(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Cycle clock value.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Time since anything was read.
    pub fn idle_recv(&self) -> Duration {
        self.now.saturating_duration_since(self.last_heard)
    }

    /// Time since anything was written.
    pub fn idle_send(&self) -> Duration {
        self.now.saturating_duration_since(self.last_send)
    }

    /// Bytes arrived in this cycle.
    pub fn on_heard(&mut self) {
        self.last_heard = self.now;
    }

    /// Bytes left in this cycle.
    pub fn on_send(&mut self) {
        self.last_send = self.now;
    }

    /// A fresh socket counts as both sent-to and heard-from.
    pub fn on_send_and_heard(&mut self) {
        self.last_send = self.now;
        self.last_heard = self.now;
    }

    /// One complete packet written.
    pub fn record_sent(&mut self) {
        self.sent_count = self.sent_count.saturating_add(1);
    }

    /// One complete frame received.
    pub fn record_received(&mut self) {
        self.recv_count = self.recv_count.saturating_add(1);
    }

    /// Packets written since the transport was created.
    pub fn sent_count(&self) -> u64 {
        self.sent_count
    }

    /// Frames received since the transport was created.
    pub fn recv_count(&self) -> u64 {
        self.recv_count
    }
}
