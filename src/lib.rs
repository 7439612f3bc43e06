//! Conclave: live session protocol for a social-deduction game companion
//!
//! One device is the authoritative narrator ("host"); any number of
//! spectator devices mirror its roster, seating, roles, nominations and
//! votes through a dumb pub/sub relay keyed by a session id. This library
//! implements the session engine: connection lifecycle with fixed-delay
//! reconnection, frame codec and command dispatch, heartbeat-based peer
//! presence and latency tracking, host-authoritative gamestate publishing
//! with spectator diff-merge, and the nomination/voting flow with its
//! seat-rotation tie-break.
//!
//! Rendering, the state store and the relay service itself are external
//! collaborators reached through the `store` and `network` seams.

pub mod core;
pub mod network;
pub mod protocol;
pub mod session;
pub mod store;

// Re-export commonly used items
pub use crate::core::{Error, Result};
pub use crate::session::{parse_join_fragment, Session};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
