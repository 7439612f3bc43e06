use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Which side of the session a device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// The single authoritative narrator device.
    Host,
    /// Any non-host device, including seated players.
    Spectator,
}

impl SessionRole {
    /// Returns true for the spectator side
    pub fn is_spectator(self) -> bool {
        matches!(self, SessionRole::Spectator)
    }
}

/// Connection lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Opaque identity token for a device within a session.
///
/// Generated once per device and persisted to the state store; an empty token
/// means "no identity yet" (or, on a roster slot, "seat unclaimed").
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Generates a new random identity token
    pub fn random() -> Self {
        use rand::Rng;
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let token: String = (0..11)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        PlayerId(token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        PlayerId(value.to_string())
    }
}

/// Identifier of a role in the static role table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(value: &str) -> Self {
        RoleId(value.to_string())
    }
}

/// Category a role belongs to.
///
/// Travelers are the one category whose specific identity is synchronized
/// across devices; every other category stays local to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleCategory {
    Townsfolk,
    Outsider,
    Minion,
    Demon,
    Traveler,
    Fabled,
}

/// An entry from the static role table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    pub category: RoleCategory,
}

impl RoleInfo {
    pub fn is_traveler(&self) -> bool {
        self.category == RoleCategory::Traveler
    }
}

/// One seat in the roster, ordered by seat index.
///
/// The seat index, not any player id, is the identity that synchronizes
/// across devices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSlot {
    pub name: String,
    /// Identity of the device that claimed this seat; empty when unclaimed.
    pub claimed_id: PlayerId,
    pub is_dead: bool,
    pub is_voteless: bool,
    pub role: Option<RoleInfo>,
}

impl PlayerSlot {
    /// Creates a fresh, unclaimed slot with the given display name
    pub fn named(name: impl Into<String>) -> Self {
        PlayerSlot {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_traveler(&self) -> bool {
        self.role.as_ref().is_some_and(RoleInfo::is_traveler)
    }
}

/// A pending nomination, identified by the two seats involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nomination {
    pub nominator: usize,
    pub nominee: usize,
}

impl Nomination {
    pub fn new(nominator: usize, nominee: usize) -> Self {
        Nomination { nominator, nominee }
    }
}

// On the wire a nomination is the two-element pair `[nominator, nominee]`.
impl Serialize for Nomination {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (self.nominator, self.nominee).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Nomination {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (nominator, nominee) = <(usize, usize)>::deserialize(deserializer)?;
        Ok(Nomination { nominator, nominee })
    }
}

/// State of one seat's vote within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteValue {
    #[default]
    Unset,
    No,
    Yes,
}

impl VoteValue {
    /// Decodes the wire representation (`null` / `false` / `true`)
    pub fn from_wire(value: Option<bool>) -> Self {
        match value {
            None => VoteValue::Unset,
            Some(false) => VoteValue::No,
            Some(true) => VoteValue::Yes,
        }
    }

    /// Encodes to the wire representation
    pub fn to_wire(self) -> Option<bool> {
        match self {
            VoteValue::Unset => None,
            VoteValue::No => Some(false),
            VoteValue::Yes => Some(true),
        }
    }
}

/// Configuration for a live session engine
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base heartbeat interval; peers are evicted after missing two.
    pub heartbeat_interval: Duration,
    /// Fixed delay before a reconnection attempt.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            heartbeat_interval: super::HEARTBEAT_INTERVAL,
            reconnect_delay: super::RECONNECT_DELAY,
        }
    }
}

/// Source of monotonic time, injected so engine timing is testable.
pub trait Clock: Send {
    /// Milliseconds elapsed on some fixed monotonic origin
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by [`Instant`].
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Clones share the same underlying time, so a copy kept by the test can
/// advance the clock owned by the engine.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by the given number of milliseconds
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Moves time forward by the given duration
    pub fn advance_by(&self, duration: Duration) {
        self.advance(duration.as_millis() as u64);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
