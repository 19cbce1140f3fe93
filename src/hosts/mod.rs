//! Host selection and load balancing.
//!
//! [`HostSet`] hands out ensemble endpoints in a shuffled round-robin order
//! and decides, when the membership changes, whether a connected client
//! should move to rebalance load.
//!
//! ```text
//!   driver ── next() ──────────────▶ HostSet ── Endpoint ──▶ Transport::connect
//!   driver ── on_connected() ──────▶ HostSet
//!   watch  ── update_server_list() ▶ HostSet ── bool (reconnect?) ──▶ driver
//! ```

mod host_set;
mod rebalance;
mod resolve;

pub use host_set::{Endpoint, HostSet};
pub use rebalance::{MembershipDiff, migration_probability};
pub use resolve::{ConnectString, DEFAULT_CLIENT_PORT, resolve_all};
