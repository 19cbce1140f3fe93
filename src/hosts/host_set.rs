//! Shuffled round-robin endpoint selection.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{Span, debug, info, info_span};

use super::rebalance::MembershipDiff;
use super::resolve::{ConnectString, resolve_all};
use crate::core::HostSetError;

/// A resolved server address.
pub type Endpoint = SocketAddr;

/// The set of ensemble members a client may connect to.
///
/// Guarantees:
/// - [`size`](Self::size) is never zero.
/// - [`next`](Self::next) always returns an endpoint; the iteration never ends.
///
/// Members are shuffled on construction and on every membership update so
/// that clients sharing a connect string spread over the ensemble. All
/// state sits behind one lock; the spin delay is slept outside of it.
#[derive(Debug)]
pub struct HostSet<R = StdRng> {
    inner: Mutex<Inner<R>>,
    span: Span,
}

#[derive(Debug)]
struct Inner<R> {
    /// Round-robin order.
    members: Vec<Endpoint>,
    /// Slot handed out by the next call to `next`.
    cursor: usize,
    /// Slot of the endpoint handed out last.
    current: Option<usize>,
    /// Round-robin calls since the last full cycle or connection.
    visited: usize,
    /// Migration targets handed out ahead of round robin after a rebalance.
    reconfig: VecDeque<Endpoint>,
    rng: R,
}

impl HostSet<StdRng> {
    /// Create a host set from resolved endpoints, shuffled with OS entropy.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, HostSetError> {
        Self::with_rng(endpoints, StdRng::from_entropy())
    }

    /// Parse and resolve a `host:port,...[/chroot]` connect string.
    ///
    /// Unresolvable hosts are dropped as long as at least one resolves.
    pub fn from_connect_string(connect_string: &str) -> Result<Self, HostSetError> {
        let parsed = ConnectString::parse(connect_string)?;
        Self::new(resolve_all(&parsed.hosts)?)
    }
}

impl<R: Rng> HostSet<R> {
    /// Create a host set using the given source of randomness.
    pub fn with_rng(mut endpoints: Vec<Endpoint>, mut rng: R) -> Result<Self, HostSetError> {
        if endpoints.is_empty() {
            return Err(HostSetError::EmptyMembership);
        }
        endpoints.shuffle(&mut rng);

        Ok(Self {
            inner: Mutex::new(Inner {
                members: endpoints,
                cursor: 0,
                current: None,
                visited: 0,
                reconfig: VecDeque::new(),
                rng,
            }),
            span: info_span!("host_set"),
        })
    }

    /// Attach the span events of this set are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Current membership count (never zero).
    pub fn size(&self) -> usize {
        self.inner.lock().members.len()
    }

    /// Snapshot of the members in round-robin order.
    pub fn members(&self) -> Vec<Endpoint> {
        self.inner.lock().members.clone()
    }

    /// Endpoint handed out most recently, if still a member.
    pub fn current(&self) -> Option<Endpoint> {
        let inner = self.inner.lock();
        inner.current.map(|idx| inner.members[idx])
    }

    /// Next endpoint to try.
    ///
    /// The call that completes a full round-robin cycle blocks the calling
    /// thread for `spin_delay` before returning. A zero delay never blocks.
    pub fn next(&self, spin_delay: Duration) -> Endpoint {
        let (endpoint, spin) = self.advance(spin_delay);
        if spin {
            std::thread::sleep(spin_delay);
        }
        endpoint
    }

    /// Async variant of [`next`](Self::next) that suspends the task instead
    /// of the thread.
    #[cfg(feature = "transport")]
    pub async fn next_async(&self, spin_delay: Duration) -> Endpoint {
        let (endpoint, spin) = self.advance(spin_delay);
        if spin {
            tokio::time::sleep(spin_delay).await;
        }
        endpoint
    }

    fn advance(&self, spin_delay: Duration) -> (Endpoint, bool) {
        let mut inner = self.inner.lock();

        if let Some(endpoint) = inner.reconfig.pop_front() {
            inner.current = inner.members.iter().position(|m| *m == endpoint);
            return (endpoint, false);
        }

        let len = inner.members.len();
        let idx = inner.cursor;
        inner.cursor = (idx + 1) % len;
        inner.current = Some(idx);
        inner.visited += 1;

        let mut spin = false;
        if inner.visited >= len {
            inner.visited = 0;
            spin = !spin_delay.is_zero();
            if spin {
                let _enter = self.span.enter();
                debug!(delay_ms = spin_delay.as_millis() as u64, "all hosts tried, spinning");
            }
        }
        (inner.members[idx], spin)
    }

    /// Record that the endpoint handed out last is now connected.
    ///
    /// Leaves reconfiguration mode and restarts the spin cycle.
    pub fn on_connected(&self) {
        let mut inner = self.inner.lock();
        inner.visited = 0;
        inner.reconfig.clear();
    }

    /// Replace the membership list.
    ///
    /// Returns `true` if the client should drop its connection to `current`
    /// and reconnect elsewhere, either because `current` left the ensemble
    /// or because it was picked to shed load onto new members. The outcome
    /// is a single random draw; see
    /// [`migration_probability`](super::migration_probability).
    pub fn update_server_list(
        &self,
        new_members: Vec<Endpoint>,
        current: Endpoint,
    ) -> Result<bool, HostSetError> {
        if new_members.is_empty() {
            return Err(HostSetError::EmptyMembership);
        }

        let mut inner = self.inner.lock();
        let diff = MembershipDiff::compute(&inner.members, &new_members, current);
        let probability = diff.probability();
        let migrate = inner.rng.r#gen::<f64>() < probability;

        let mut members = new_members;
        members.shuffle(&mut inner.rng);
        let len = members.len();

        match members.iter().position(|m| *m == current) {
            Some(pos) => {
                inner.current = Some(pos);
                inner.cursor = (pos + 1) % len;
            }
            None => {
                inner.current = None;
                inner.cursor = inner.rng.gen_range(0..len);
            }
        }
        inner.members = members;
        inner.visited = 0;

        inner.reconfig.clear();
        if migrate && diff.retained {
            let mut arrivals = diff.arrivals;
            arrivals.shuffle(&mut inner.rng);
            inner.reconfig.extend(arrivals);
        }

        let _enter = self.span.enter();
        info!(
            old_size = diff.survivors,
            new_size = len,
            retained = diff.retained,
            probability,
            migrate,
            "membership updated"
        );
        Ok(migrate)
    }
}
