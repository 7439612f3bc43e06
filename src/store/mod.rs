//! State store collaborator interface
//!
//! The engine never owns game state directly: it reads attributes from a
//! store and writes typed [`Mutation`]s back. The store is an external
//! collaborator — UI layers subscribe to it for rendering — so the crate
//! only defines the interface plus an in-memory reference implementation.

mod memory;
mod roles;

pub use self::memory::MemoryStore;
pub use self::roles::{RoleLookup, RoleTable};

use serde_json::Value;

use crate::core::{Nomination, PlayerId, PlayerSlot, RoleInfo, VoteValue};

/// The engine's write vocabulary against the store.
///
/// Every state change the engine performs is one of these; a store
/// implementation interprets them and notifies its own subscribers.
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Persist the local device's identity token.
    SetPlayerId(PlayerId),
    /// Record or clear the channel this device is associated with.
    SetSessionId(Option<String>),
    /// Preset the role for the next connection attempt.
    SetSpectator(bool),
    /// Number of live remote participants.
    SetPlayerCount(usize),
    /// Observed session latency in milliseconds.
    SetLatency(u64),
    /// Whether the session is currently trying to re-establish itself.
    SetReconnecting(bool),
    /// Begin, replace or clear a vote round.
    SetNomination {
        nomination: Option<Nomination>,
        /// Per-seat votes; `None` resets every seat to unset.
        votes: Option<Vec<VoteValue>>,
        voting_speed: Option<u64>,
        locked: Option<usize>,
    },
    SetVotingSpeed(u64),
    /// Record one seat's vote.
    Vote { seat: usize, value: VoteValue },
    /// Set the number of finalized seats in the current round.
    SetLockedCount(usize),
    /// Append a seat with the given display name.
    AddPlayer(String),
    /// Remove the seat at the given index.
    RemovePlayer(usize),
    /// Change a single field of one seat.
    UpdateSlot { seat: usize, field: SlotField },
    /// Exchange two seats.
    SwapSeats(usize, usize),
    /// Move a seat to another position.
    MoveSeat { from: usize, to: usize },
    /// Assign the edition, with role definitions for custom editions.
    SetEdition {
        edition: String,
        roles: Option<Vec<Value>>,
    },
    /// Assign the fabled roles in play.
    SetFabled(Vec<RoleInfo>),
}

/// A typed single-field change to one roster slot.
#[derive(Clone, Debug)]
pub enum SlotField {
    Name(String),
    ClaimedId(PlayerId),
    Dead(bool),
    Voteless(bool),
    Role(Option<RoleInfo>),
}

/// Attribute reads and mutation writes the engine needs from a store.
///
/// Reads return owned values; rosters are small and the engine runs
/// single-threaded, so cloning at this seam keeps the trait object-safe
/// without lifetime plumbing.
pub trait SessionStore: Send {
    fn player_id(&self) -> PlayerId;
    fn session_id(&self) -> Option<String>;
    /// Role preset for the next connection attempt.
    fn is_spectator(&self) -> bool;
    fn players(&self) -> Vec<PlayerSlot>;
    fn nomination(&self) -> Option<Nomination>;
    fn votes(&self) -> Vec<VoteValue>;
    fn voting_speed(&self) -> u64;
    fn locked_count(&self) -> usize;
    fn edition(&self) -> String;
    /// Role definitions backing a custom edition.
    fn custom_roles(&self) -> Vec<Value>;
    fn fabled(&self) -> Vec<RoleInfo>;
    fn player_count(&self) -> usize;
    fn latency_ms(&self) -> u64;
    fn reconnecting(&self) -> bool;
    /// Apply one mutation.
    fn apply(&mut self, mutation: Mutation);
}
