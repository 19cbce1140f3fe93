//! # Ensemble Link
//!
//! Client-side connection layer for a replicated coordination service
//! (an *ensemble* of interchangeable servers). It keeps one live,
//! reconnectable session connection to one member at a time:
//!
//! - **Host selection**: shuffled round robin over resolved endpoints, with
//!   a spin delay once every member was tried
//! - **Rebalancing**: a probabilistic decision to move an established
//!   connection when membership changes, so load evens out
//! - **Transport**: a framed, length-prefixed session protocol with a
//!   connect handshake, an authentication gate, liveness timing and
//!   prompt cancellation
//!
//! ## Feature Flags
//!
//! - `transport` (default): Transport layer (framing, handshake, backends)
//!
//! ## Modules
//!
//! - [`core`]: Contracts, constants, and error types (always included)
//! - [`hosts`]: Host selection and rebalancing (always included)
//! - [`transport`]: Transport layer (requires `transport` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use ensemble_link::prelude::*;
//!
//! # async fn run(driver: &mut impl ConnectionDriver) -> Result<(), Box<dyn std::error::Error>> {
//! let hosts = HostSet::from_connect_string("10.0.0.1:2181,10.0.0.2:2181")?;
//! let mut transport = TcpTransport::new(TransportConfig::default());
//! let mut pending = PendingQueue::new();
//!
//! loop {
//!     transport.cleanup();
//!     transport.connect(hosts.next_async(Duration::from_millis(1000)).await)?;
//!
//!     while transport.phase() != ConnectionPhase::Closed {
//!         if let Err(e) = transport
//!             .do_transport(Duration::from_secs(1), &mut pending, driver)
//!             .await
//!         {
//!             tracing::warn!(error = %e, "connection lost");
//!             break;
//!         }
//!         if transport.is_connected() {
//!             hosts.on_connected();
//!         }
//!     }
//!     if transport.phase() == ConnectionPhase::Closed {
//!         return Ok(());
//!     }
//! }
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Host selection (always included)
pub mod hosts;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::hosts::{ConnectString, Endpoint, HostSet};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        ConnectRequest, ConnectResponse, ConnectionPhase, OutgoingQueue, Packet, PacketKind,
        PendingQueue, StreamTransport, TcpTransport, TransportConfig, TransportHandle,
    };
}

// Re-export commonly used items at crate root
pub use core::{DecodeError, HostSetError};
pub use hosts::{Endpoint, HostSet};

#[cfg(feature = "transport")]
pub use core::{ConnectionDriver, Transport, TransportError, TransportResult};

#[cfg(feature = "transport")]
pub use transport::{ConnectionPhase, Packet, TcpTransport, TransportConfig};
