//! Transport management and relay plumbing
//!
//! This module defines the transport seam the engine speaks through, an
//! in-process relay for tests and offline play, a TCP transport for real
//! networks, and the async driver that runs a session with live timers.

mod driver;
mod local;
mod tcp;

pub use self::driver::{SessionDriver, SessionHandle};
pub use self::local::{LocalRelay, LocalTransport};
pub use self::tcp::TcpTransport;

use crate::core::{Result, SessionRole, HOST_CHANNEL_SUFFIX};

/// Events a transport surfaces through [`Transport::poll`].
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The transport session is established and frames may flow.
    Opened,
    /// A text frame arrived from the relay.
    Frame(String),
    /// The transport session ended from the remote side or by failure.
    Closed {
        /// True for a deliberate, clean shutdown of the session; false for
        /// anything unexpected (triggers reconnection).
        normal: bool,
        /// Optional human-readable close reason to surface to the user.
        reason: Option<String>,
    },
}

/// A frame pipe to the relay service.
///
/// Implementations deliver events only through [`Transport::poll`], never by
/// callback, so the engine stays single-threaded. A locally initiated
/// [`Transport::close`] is silent: `Closed` events report remote or
/// unexpected closure only. `open` may be called again after a close to
/// establish a fresh session on the same transport value.
pub trait Transport: Send {
    /// Begin establishing a session on the given logical address.
    fn open(&mut self, address: &str) -> Result<()>;
    /// Send one text frame; fails when the transport is not open.
    fn send(&mut self, frame: String) -> Result<()>;
    fn is_open(&self) -> bool;
    /// Tear the session down. `normal` marks a clean goodbye.
    fn close(&mut self, normal: bool);
    /// Drain pending events without blocking.
    fn poll(&mut self) -> Vec<TransportEvent>;
}

/// Derives the relay address for a channel, disambiguated by role so host
/// and spectators can coexist on one channel id.
pub fn channel_address(channel: &str, role: SessionRole) -> String {
    match role {
        SessionRole::Host => format!("{channel}{HOST_CHANNEL_SUFFIX}"),
        SessionRole::Spectator => channel.to_string(),
    }
}

/// Strips the role disambiguator back off an address.
pub(crate) fn base_channel(address: &str) -> &str {
    address.strip_suffix(HOST_CHANNEL_SUFFIX).unwrap_or(address)
}
