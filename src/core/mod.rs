//! Core types and traits for the session protocol
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{
    Clock, ConnectionState, ManualClock, MonotonicClock, Nomination, PlayerId, PlayerSlot,
    RoleCategory, RoleId, RoleInfo, SessionConfig, SessionRole, VoteValue,
};

use std::time::Duration;

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before a reconnection attempt after an abnormal close.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Upper bound (exclusive) on an acceptable latency sample, in milliseconds.
pub const MAX_LATENCY_MS: u64 = 30_000;

/// Address suffix distinguishing the host endpoint of a channel.
pub const HOST_CHANNEL_SUFFIX: &str = "-host";

/// Payload of a gamestate request frame.
pub const GAMESTATE_REQUEST: &str = "gs";

/// Latency placeholder tag carried by outgoing pings; the relay substitutes
/// the measured round-trip time before fanning the ping out.
pub const LATENCY_TAG: &str = "latency";
