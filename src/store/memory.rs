use serde_json::Value;

use crate::core::{Nomination, PlayerId, PlayerSlot, RoleInfo, VoteValue};
use super::{Mutation, SessionStore, SlotField};

/// In-memory reference implementation of [`SessionStore`].
///
/// Keeps the `votes` sequence the same length as the roster on every
/// roster-shaping mutation, and resets the vote round whenever a new
/// nomination arrives. A subscription callback, if registered, observes
/// every mutation before it is applied.
pub struct MemoryStore {
    player_id: PlayerId,
    session_id: Option<String>,
    spectator: bool,
    players: Vec<PlayerSlot>,
    nomination: Option<Nomination>,
    votes: Vec<VoteValue>,
    voting_speed: u64,
    locked_count: usize,
    edition: String,
    custom_roles: Vec<Value>,
    fabled: Vec<RoleInfo>,
    player_count: usize,
    latency_ms: u64,
    reconnecting: bool,
    observer: Option<Box<dyn FnMut(&Mutation) + Send>>,
}

impl MemoryStore {
    /// Creates a store preset to connect as the host
    pub fn host() -> Self {
        Self::new(false)
    }

    /// Creates a store preset to connect as a spectator
    pub fn spectator() -> Self {
        Self::new(true)
    }

    fn new(spectator: bool) -> Self {
        MemoryStore {
            player_id: PlayerId::default(),
            session_id: None,
            spectator,
            players: Vec::new(),
            nomination: None,
            votes: Vec::new(),
            voting_speed: 3,
            locked_count: 0,
            edition: String::new(),
            custom_roles: Vec::new(),
            fabled: Vec::new(),
            player_count: 0,
            latency_ms: 0,
            reconnecting: false,
            observer: None,
        }
    }

    /// Registers a callback invoked with every mutation
    pub fn subscribe(&mut self, observer: impl FnMut(&Mutation) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Seeds the roster with named, unclaimed seats
    pub fn seed_players(&mut self, names: &[&str]) {
        for name in names {
            self.apply(Mutation::AddPlayer((*name).to_string()));
        }
    }

    fn update_slot(&mut self, seat: usize, field: SlotField) {
        let Some(slot) = self.players.get_mut(seat) else {
            return;
        };
        match field {
            SlotField::Name(name) => slot.name = name,
            SlotField::ClaimedId(id) => slot.claimed_id = id,
            SlotField::Dead(dead) => slot.is_dead = dead,
            SlotField::Voteless(voteless) => slot.is_voteless = voteless,
            SlotField::Role(role) => slot.role = role,
        }
    }
}

impl SessionStore for MemoryStore {
    fn player_id(&self) -> PlayerId {
        self.player_id.clone()
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    fn is_spectator(&self) -> bool {
        self.spectator
    }

    fn players(&self) -> Vec<PlayerSlot> {
        self.players.clone()
    }

    fn nomination(&self) -> Option<Nomination> {
        self.nomination
    }

    fn votes(&self) -> Vec<VoteValue> {
        self.votes.clone()
    }

    fn voting_speed(&self) -> u64 {
        self.voting_speed
    }

    fn locked_count(&self) -> usize {
        self.locked_count
    }

    fn edition(&self) -> String {
        self.edition.clone()
    }

    fn custom_roles(&self) -> Vec<Value> {
        self.custom_roles.clone()
    }

    fn fabled(&self) -> Vec<RoleInfo> {
        self.fabled.clone()
    }

    fn player_count(&self) -> usize {
        self.player_count
    }

    fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    fn reconnecting(&self) -> bool {
        self.reconnecting
    }

    fn apply(&mut self, mutation: Mutation) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&mutation);
        }
        match mutation {
            Mutation::SetPlayerId(id) => self.player_id = id,
            Mutation::SetSessionId(session_id) => self.session_id = session_id,
            Mutation::SetSpectator(spectator) => self.spectator = spectator,
            Mutation::SetPlayerCount(count) => self.player_count = count,
            Mutation::SetLatency(ms) => self.latency_ms = ms,
            Mutation::SetReconnecting(reconnecting) => self.reconnecting = reconnecting,
            Mutation::SetNomination {
                nomination,
                votes,
                voting_speed,
                locked,
            } => {
                self.nomination = nomination;
                let mut votes = votes.unwrap_or_default();
                votes.resize(self.players.len(), VoteValue::Unset);
                self.votes = votes;
                if let Some(speed) = voting_speed {
                    self.voting_speed = speed;
                }
                self.locked_count = locked.unwrap_or(0);
            }
            Mutation::SetVotingSpeed(seconds) => self.voting_speed = seconds,
            Mutation::Vote { seat, value } => {
                if let Some(vote) = self.votes.get_mut(seat) {
                    *vote = value;
                }
            }
            Mutation::SetLockedCount(locked) => self.locked_count = locked,
            Mutation::AddPlayer(name) => {
                self.players.push(PlayerSlot::named(name));
                self.votes.push(VoteValue::Unset);
            }
            Mutation::RemovePlayer(seat) => {
                if seat < self.players.len() {
                    self.players.remove(seat);
                    self.votes.remove(seat);
                }
            }
            Mutation::UpdateSlot { seat, field } => self.update_slot(seat, field),
            Mutation::SwapSeats(a, b) => {
                if a < self.players.len() && b < self.players.len() {
                    self.players.swap(a, b);
                }
            }
            Mutation::MoveSeat { from, to } => {
                if from < self.players.len() && to < self.players.len() {
                    let slot = self.players.remove(from);
                    self.players.insert(to, slot);
                }
            }
            Mutation::SetEdition { edition, roles } => {
                self.edition = edition;
                if let Some(roles) = roles {
                    self.custom_roles = roles;
                }
            }
            Mutation::SetFabled(fabled) => self.fabled = fabled,
        }
    }
}
