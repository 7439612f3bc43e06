//! The session engine
//!
//! One [`Session`] per device. Host and spectator run the same engine with
//! role-gated handlers, not separate code paths: a device's role only
//! decides which incoming commands it applies and which local edits it
//! broadcasts. All state lives in the injected store; all timing comes from
//! the injected clock; all I/O goes through the injected transport. Every
//! handler runs to completion before the next event, so the engine needs no
//! locking.

mod gamestate;
mod presence;
mod voting;

use std::mem;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::{
    Clock, ConnectionState, MonotonicClock, PlayerId, Result, SessionConfig, SessionRole,
    LATENCY_TAG,
};
use crate::network::{channel_address, Transport, TransportEvent};
use crate::protocol::{decode_frame, encode_frame, Command, LatencyField, SlotSummary};
use crate::store::{Mutation, RoleLookup, SessionStore};

use self::presence::{accept_latency, PresenceTracker};

/// Parses a `play/<channel>` join fragment — the payload of an invite link
/// or QR code — into a channel id. A leading `#` is tolerated.
pub fn parse_join_fragment(fragment: &str) -> Option<&str> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let (command, channel) = fragment.split_once('/')?;
    (command == "play" && !channel.is_empty()).then_some(channel)
}

/// The live session protocol engine.
pub struct Session {
    config: SessionConfig,
    clock: Box<dyn Clock>,
    transport: Box<dyn Transport>,
    store: Box<dyn SessionStore>,
    roles: Arc<dyn RoleLookup>,
    state: ConnectionState,
    role: SessionRole,
    channel: Option<String>,
    presence: PresenceTracker,
    /// Roster summary as last published; lets single-field role updates
    /// detect a seat that stopped being a traveler. Host side only.
    published: Vec<SlotSummary>,
    heartbeat_at: Option<u64>,
    reconnect_at: Option<u64>,
    notices: Vec<String>,
}

impl Session {
    /// Creates an engine with default timing on a monotonic clock
    pub fn new(
        transport: Box<dyn Transport>,
        store: Box<dyn SessionStore>,
        roles: Arc<dyn RoleLookup>,
    ) -> Self {
        Self::with_config(
            SessionConfig::default(),
            transport,
            store,
            roles,
            Box::new(MonotonicClock::default()),
        )
    }

    /// Creates an engine with explicit timing and clock, for embedders and
    /// deterministic tests
    pub fn with_config(
        config: SessionConfig,
        transport: Box<dyn Transport>,
        store: Box<dyn SessionStore>,
        roles: Arc<dyn RoleLookup>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let role = if store.is_spectator() {
            SessionRole::Spectator
        } else {
            SessionRole::Host
        };
        let presence = PresenceTracker::new(config.heartbeat_interval);
        Session {
            config,
            clock,
            transport,
            store,
            roles,
            state: ConnectionState::Disconnected,
            role,
            channel: None,
            presence,
            published: Vec::new(),
            heartbeat_at: None,
            reconnect_at: None,
            notices: Vec::new(),
        }
    }

    /// Opens a session on the given channel.
    ///
    /// Generates and persists a player identity if none exists, resets the
    /// peer and latency counters, reads the role preset from the store and
    /// opens the transport on the role-disambiguated address.
    pub fn connect(&mut self, channel: &str) -> Result<()> {
        if self.store.player_id().is_empty() {
            self.store.apply(Mutation::SetPlayerId(PlayerId::random()));
        }
        self.role = if self.store.is_spectator() {
            SessionRole::Spectator
        } else {
            SessionRole::Host
        };
        // A fresh attempt supersedes any scheduled retry.
        self.heartbeat_at = None;
        self.reconnect_at = None;
        self.presence.reset();
        self.published.clear();
        self.store.apply(Mutation::SetPlayerCount(0));
        self.store.apply(Mutation::SetLatency(0));
        self.store.apply(Mutation::SetSessionId(Some(channel.to_string())));
        if self.transport.is_open() {
            self.transport.close(true);
        }
        self.channel = Some(channel.to_string());
        self.state = ConnectionState::Connecting;
        info!("connecting to channel {channel} as {:?}", self.role);
        self.transport.open(&channel_address(channel, self.role))
    }

    /// Applies a join fragment from an invite link or QR code: presets the
    /// spectator role and connects to the named channel.
    ///
    /// Returns whether a connection attempt was started.
    pub fn bootstrap(&mut self, fragment: &str) -> Result<bool> {
        match parse_join_fragment(fragment) {
            Some(channel) => {
                let channel = channel.to_string();
                self.store.apply(Mutation::SetSpectator(true));
                self.connect(&channel).map(|_| true)
            }
            None => Ok(false),
        }
    }

    /// Reconnects to the channel recorded in the store, if any.
    ///
    /// Returns whether a connection attempt was started.
    pub fn resume(&mut self) -> Result<bool> {
        match self.store.session_id() {
            Some(channel) => self.connect(&channel).map(|_| true),
            None => Ok(false),
        }
    }

    /// Closes the current session, if any.
    ///
    /// Cancels the heartbeat and any pending reconnection before touching
    /// the transport, sends a best-effort leaving notice, and resets the
    /// peer and latency counters.
    pub fn disconnect(&mut self) {
        self.heartbeat_at = None;
        self.reconnect_at = None;
        self.presence.reset();
        self.store.apply(Mutation::SetPlayerCount(0));
        self.store.apply(Mutation::SetLatency(0));
        self.store.apply(Mutation::SetReconnecting(false));
        if self.transport.is_open() {
            let player_id = self.store.player_id();
            self.send(Command::Bye(player_id));
            self.transport.close(true);
        }
        self.store.apply(Mutation::SetSessionId(None));
        self.state = ConnectionState::Disconnected;
        self.channel = None;
    }

    /// Drains transport events and fires any due timers.
    ///
    /// The embedding event loop calls this; everything else happens inside.
    pub fn pump(&mut self) {
        for event in self.transport.poll() {
            match event {
                TransportEvent::Opened => self.on_open(),
                TransportEvent::Frame(text) => self.on_frame(&text),
                TransportEvent::Closed { normal, reason } => self.on_close(normal, reason),
            }
        }
        self.tick();
    }

    /// Fires the heartbeat and reconnection deadlines if they are due
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        if self.state == ConnectionState::Connected && self.heartbeat_at.is_some_and(|at| now >= at)
        {
            self.ping();
        }
        if self.reconnect_at.is_some_and(|at| now >= at) {
            self.reconnect_at = None;
            if let Some(channel) = self.channel.clone() {
                debug!("attempting reconnection to {channel}");
                if let Err(err) = self.connect(&channel) {
                    warn!("reconnection failed: {err}");
                    self.state = ConnectionState::Reconnecting;
                    self.reconnect_at =
                        Some(now + self.config.reconnect_delay.as_millis() as u64);
                }
            }
        }
    }

    /// Applies a local state edit and broadcasts whatever this session's
    /// role is allowed to share.
    ///
    /// The voting flow has dedicated operations ([`Session::nominate`],
    /// [`Session::cast_vote`], [`Session::lock_vote`],
    /// [`Session::set_voting_speed`]); routing those mutations through here
    /// changes local state without broadcasting.
    pub fn apply_local(&mut self, mutation: Mutation) {
        self.store.apply(mutation.clone());
        match mutation {
            Mutation::AddPlayer(_) | Mutation::RemovePlayer(_) => self.publish_gamestate(),
            Mutation::UpdateSlot { seat, field } => self.send_player(seat, &field),
            Mutation::SwapSeats(a, b) => {
                if !self.role.is_spectator() {
                    self.send(Command::Swap(json!([a, b])));
                }
            }
            Mutation::MoveSeat { from, to } => {
                if !self.role.is_spectator() {
                    self.send(Command::Move(json!([from, to])));
                }
            }
            Mutation::SetEdition { .. } => self.send_edition(),
            Mutation::SetFabled(_) => self.send_fabled(),
            _ => {}
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Read access to the underlying store
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Drains user-facing notices, such as a close reason from the relay
    pub fn take_notices(&mut self) -> Vec<String> {
        mem::take(&mut self.notices)
    }

    fn on_open(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Connected;
        self.store.apply(Mutation::SetReconnecting(false));
        info!("channel open as {:?}", self.role);
        if self.role.is_spectator() {
            self.send(Command::GamestateRequest);
        } else {
            self.publish_gamestate();
        }
        self.ping();
    }

    fn on_close(&mut self, normal: bool, reason: Option<String>) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.heartbeat_at = None;
        self.transport.close(normal);
        if normal {
            self.state = ConnectionState::Disconnected;
            self.reconnect_at = None;
            self.store.apply(Mutation::SetSessionId(None));
            if let Some(reason) = reason.filter(|reason| !reason.is_empty()) {
                self.notices.push(reason);
            }
        } else {
            self.state = ConnectionState::Reconnecting;
            self.store.apply(Mutation::SetReconnecting(true));
            // At most one outstanding attempt, however many closes arrive.
            if self.reconnect_at.is_none() {
                self.reconnect_at =
                    Some(self.clock.now_ms() + self.config.reconnect_delay.as_millis() as u64);
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        if let Some(command) = decode_frame(text) {
            self.dispatch(command);
        }
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::GamestateRequest => self.publish_gamestate(),
            Command::Edition(update) => self.apply_edition(update),
            Command::Fabled(ids) => self.apply_fabled(ids),
            Command::Gamestate(payload) => self.apply_gamestate(payload),
            Command::Player(update) => self.apply_player(update),
            Command::Claim { seat, player_id } => self.apply_claim(seat, player_id),
            Command::Ping {
                is_spectator,
                player_id,
                latency,
            } => self.handle_ping(Some((is_spectator, player_id, latency.millis()))),
            Command::Nomination(nomination) => {
                if self.role.is_spectator() {
                    self.store.apply(Mutation::SetNomination {
                        nomination,
                        votes: None,
                        voting_speed: None,
                        locked: None,
                    });
                }
            }
            Command::VotingSpeed(seconds) => {
                if self.role.is_spectator() {
                    self.store.apply(Mutation::SetVotingSpeed(seconds));
                }
            }
            Command::Vote {
                seat,
                value,
                from_host,
            } => self.apply_vote(seat, value, from_host),
            Command::Lock { locked, vote } => self.apply_lock(locked, vote),
            Command::Swap(payload) => self.apply_swap(payload),
            Command::Move(payload) => self.apply_move(payload),
            Command::Bye(player_id) => self.handle_bye(player_id),
        }
    }

    /// Sends a heartbeat, processes it locally, and schedules the next one
    fn ping(&mut self) {
        self.send(Command::Ping {
            is_spectator: self.role.is_spectator(),
            player_id: self.store.player_id(),
            latency: LatencyField::Tag(LATENCY_TAG.to_string()),
        });
        // Processing our own tick runs eviction even with no peers around.
        self.handle_ping(None);
        self.heartbeat_at =
            Some(self.clock.now_ms() + self.config.heartbeat_interval.as_millis() as u64);
    }

    /// Presence bookkeeping for one ping receipt (or the local tick)
    pub(super) fn handle_ping(&mut self, sender: Option<(bool, PlayerId, Option<i64>)>) {
        let now = self.clock.now_ms();
        self.presence.sweep(now);
        if self.role == SessionRole::Host {
            // Stale claims would block re-seating.
            for (seat, slot) in self.store.players().into_iter().enumerate() {
                if !slot.claimed_id.is_empty() && !self.presence.contains(&slot.claimed_id) {
                    self.set_slot_claim(seat, PlayerId::default());
                }
            }
        }
        if let Some((sender_is_spectator, player_id, latency)) = sender {
            if !player_id.is_empty() {
                self.presence.record(player_id.clone(), now);
                if let Some(ms) = latency.and_then(accept_latency) {
                    match self.role {
                        SessionRole::Spectator if !sender_is_spectator => {
                            // The host round trip is the session latency.
                            self.store.apply(Mutation::SetLatency(ms));
                        }
                        SessionRole::Host => {
                            self.presence.record_latency(&player_id, ms);
                            if let Some(mean) = self.presence.mean_latency() {
                                self.store.apply(Mutation::SetLatency(mean));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        self.store
            .apply(Mutation::SetPlayerCount(self.presence.count()));
    }

    /// Marks a peer alive right now, without full ping processing
    pub(super) fn note_presence(&mut self, player_id: PlayerId) {
        if !player_id.is_empty() {
            let now = self.clock.now_ms();
            self.presence.record(player_id, now);
        }
    }

    fn handle_bye(&mut self, player_id: PlayerId) {
        self.presence.remove(&player_id);
        self.store
            .apply(Mutation::SetPlayerCount(self.presence.count()));
    }

    /// Encodes and sends a command; a no-op unless the transport is open
    fn send(&mut self, command: Command) {
        if !self.transport.is_open() {
            return;
        }
        match encode_frame(&command) {
            Ok(frame) => {
                if let Err(err) = self.transport.send(frame) {
                    debug!("dropped {} frame: {err}", command.name());
                }
            }
            Err(err) => warn!("failed to encode {} frame: {err}", command.name()),
        }
    }
}
