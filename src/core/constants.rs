//! Wire and timing defaults for the client connection layer.
//!
//! Wire values are fixed by the server protocol and MUST NOT be changed.
//! Timing values are defaults; drivers override them through
//! `TransportConfig`.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Size of the big-endian length prefix in front of every frame.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// Default upper bound (exclusive) on a declared frame length.
pub const DEFAULT_MAX_PACKET_LEN: usize = 4096 * 1024;

/// Size of the session secret handed out by the server.
pub const SESSION_SECRET_LEN: usize = 16;

/// Protocol version sent in the connect request.
pub const PROTOCOL_VERSION: i32 = 0;

// =============================================================================
// TIMING
// =============================================================================

/// Bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session timeout a client asks for when nothing else is configured.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// QUEUEING
// =============================================================================

/// Maximum packets moved from the outgoing queue into the socket per cycle.
pub const DEFAULT_DRAIN_LIMIT: usize = 64;

/// Initial capacity of the per-connection read buffer.
pub const READ_BUFFER_CAPACITY: usize = 16 * 1024;
