// Gamestate synchronization.
//
// The host is authoritative: it publishes edition, fabled list and the
// combined roster/nomination/vote snapshot, and confirms seat claims.
// Spectators diff-merge snapshots into their store. A snapshot is rebuilt
// from current state on every publish and applied immediately on receipt;
// nothing is staged.
//
// Roles are asymmetric on the wire: only traveler identities travel.
// Everything else the host knows about a seat's role stays local, so a
// snapshot can clear a traveler role but can never leak or overwrite an
// ordinary one.

use serde_json::Value;
use tracing::debug;

use crate::core::{PlayerId, RoleId, VoteValue};
use crate::protocol::{
    Command, EditionUpdate, GamestatePayload, PlayerUpdate, SlotProperty, SlotSummary,
};
use crate::store::{Mutation, SlotField};
use super::Session;

impl Session {
    /// Publishes edition, fabled and the combined snapshot (host only).
    pub fn publish_gamestate(&mut self) {
        if self.role.is_spectator() {
            return;
        }
        let players = self.store.players();
        self.published = players
            .iter()
            .map(|slot| SlotSummary {
                name: slot.name.clone(),
                id: slot.claimed_id.clone(),
                is_dead: slot.is_dead,
                is_voteless: slot.is_voteless,
                role_id: slot
                    .role
                    .as_ref()
                    .filter(|role| role.is_traveler())
                    .map(|role| role.id.clone()),
            })
            .collect();
        self.send_edition();
        self.send_fabled();
        let nomination = self.store.nomination();
        let votes = nomination
            .is_some()
            .then(|| self.store.votes().into_iter().map(VoteValue::to_wire).collect());
        self.send(Command::Gamestate(GamestatePayload {
            gamestate: self.published.clone(),
            nomination,
            voting_speed: self.store.voting_speed(),
            locked_vote: self.store.locked_count(),
            votes,
        }));
    }

    /// Publishes the edition, with the role list for custom editions
    pub(super) fn send_edition(&mut self) {
        if self.role.is_spectator() {
            return;
        }
        let edition = self.store.edition();
        let roles = (edition == "custom").then(|| self.store.custom_roles());
        self.send(Command::Edition(EditionUpdate { edition, roles }));
    }

    /// Publishes the fabled role ids in play
    pub(super) fn send_fabled(&mut self) {
        if self.role.is_spectator() {
            return;
        }
        let ids = self.store.fabled().into_iter().map(|role| role.id).collect();
        self.send(Command::Fabled(ids));
    }

    pub(super) fn apply_edition(&mut self, update: EditionUpdate) {
        if !self.role.is_spectator() {
            return;
        }
        self.store.apply(Mutation::SetEdition {
            edition: update.edition,
            roles: update.roles,
        });
    }

    pub(super) fn apply_fabled(&mut self, ids: Vec<RoleId>) {
        if !self.role.is_spectator() {
            return;
        }
        let fabled = ids.iter().filter_map(|id| self.roles.fabled(id)).collect();
        self.store.apply(Mutation::SetFabled(fabled));
    }

    /// Diff-merges an incoming snapshot into the local store (spectator only)
    pub(super) fn apply_gamestate(&mut self, payload: GamestatePayload) {
        if !self.role.is_spectator() {
            return;
        }
        let GamestatePayload {
            gamestate,
            nomination,
            voting_speed,
            locked_vote,
            votes,
        } = payload;
        // Converge roster length first so the vote sequence resizes in step.
        let mut roster = self.store.players().len();
        while roster < gamestate.len() {
            self.store
                .apply(Mutation::AddPlayer(gamestate[roster].name.clone()));
            roster += 1;
        }
        while roster > gamestate.len() {
            roster -= 1;
            self.store.apply(Mutation::RemovePlayer(roster));
        }
        self.store.apply(Mutation::SetNomination {
            nomination,
            votes: votes.map(|votes| votes.into_iter().map(VoteValue::from_wire).collect()),
            voting_speed: Some(voting_speed),
            locked: Some(locked_vote),
        });
        for (seat, summary) in gamestate.iter().enumerate() {
            self.reconcile_slot(seat, summary);
        }
    }

    /// Applies whichever fields of one slot differ from the summary
    fn reconcile_slot(&mut self, seat: usize, summary: &SlotSummary) {
        let Some(slot) = self.store.players().into_iter().nth(seat) else {
            return;
        };
        if slot.name != summary.name {
            self.store.apply(Mutation::UpdateSlot {
                seat,
                field: SlotField::Name(summary.name.clone()),
            });
        }
        if slot.claimed_id != summary.id {
            self.store.apply(Mutation::UpdateSlot {
                seat,
                field: SlotField::ClaimedId(summary.id.clone()),
            });
        }
        if slot.is_dead != summary.is_dead {
            self.store.apply(Mutation::UpdateSlot {
                seat,
                field: SlotField::Dead(summary.is_dead),
            });
        }
        if slot.is_voteless != summary.is_voteless {
            self.store.apply(Mutation::UpdateSlot {
                seat,
                field: SlotField::Voteless(summary.is_voteless),
            });
        }
        match &summary.role_id {
            Some(role_id) => {
                if slot.role.as_ref().map(|role| &role.id) != Some(role_id) {
                    match self.roles.role(role_id) {
                        Some(role) => self.store.apply(Mutation::UpdateSlot {
                            seat,
                            field: SlotField::Role(Some(role)),
                        }),
                        None => debug!("unknown traveler role {role_id}"),
                    }
                }
            }
            None => {
                if slot.is_traveler() {
                    self.store.apply(Mutation::UpdateSlot {
                        seat,
                        field: SlotField::Role(None),
                    });
                }
            }
        }
    }

    /// Applies a single-field update to one seat
    pub(super) fn apply_player(&mut self, update: PlayerUpdate) {
        let PlayerUpdate {
            index,
            property,
            value,
        } = update;
        let Some(slot) = self.store.players().into_iter().nth(index) else {
            return;
        };
        let field = match property {
            SlotProperty::Name => serde_json::from_value(value).ok().map(SlotField::Name),
            SlotProperty::Id => serde_json::from_value(value).ok().map(SlotField::ClaimedId),
            SlotProperty::IsDead => serde_json::from_value(value).ok().map(SlotField::Dead),
            SlotProperty::IsVoteless => serde_json::from_value(value).ok().map(SlotField::Voteless),
            // An empty value clears a traveler role back to unknown; any
            // other value is looked up as a traveler role id.
            SlotProperty::Role => match serde_json::from_value::<RoleId>(value).ok() {
                Some(role_id) if role_id.0.is_empty() => {
                    slot.is_traveler().then_some(SlotField::Role(None))
                }
                Some(role_id) => self
                    .roles
                    .role(&role_id)
                    .map(|role| SlotField::Role(Some(role))),
                None => None,
            },
        };
        match field {
            Some(field) => self.store.apply(Mutation::UpdateSlot { seat: index, field }),
            None => debug!("discarding player update for seat {index}"),
        }
    }

    /// Broadcasts one slot field change (host only).
    ///
    /// Role changes consult the published cache: travelers go out by id, a
    /// seat that stops being a traveler goes out as an explicit clear, and
    /// ordinary roles are withheld entirely.
    pub(super) fn send_player(&mut self, seat: usize, field: &SlotField) {
        if self.role.is_spectator() {
            return;
        }
        if seat >= self.published.len() {
            return;
        }
        let (property, value) = match field {
            SlotField::Name(name) => (SlotProperty::Name, Value::String(name.clone())),
            SlotField::ClaimedId(id) => (SlotProperty::Id, Value::String(id.0.clone())),
            SlotField::Dead(dead) => (SlotProperty::IsDead, Value::Bool(*dead)),
            SlotField::Voteless(voteless) => (SlotProperty::IsVoteless, Value::Bool(*voteless)),
            SlotField::Role(role) => match role {
                Some(role) if role.is_traveler() => {
                    self.published[seat].role_id = Some(role.id.clone());
                    (SlotProperty::Role, Value::String(role.id.0.clone()))
                }
                _ => {
                    if self.published[seat].role_id.take().is_some() {
                        (SlotProperty::Role, Value::String(String::new()))
                    } else {
                        return;
                    }
                }
            },
        };
        self.send(Command::Player(PlayerUpdate {
            index: seat,
            property,
            value,
        }));
    }

    /// Confirms or rejects a seat claim (host only).
    ///
    /// Any seat previously held by the claimant is vacated first; the
    /// claimant's presence is refreshed as if a ping had arrived.
    pub(super) fn apply_claim(&mut self, seat: Option<usize>, player_id: PlayerId) {
        if self.role.is_spectator() {
            return;
        }
        // The claim itself proves the claimant is alive; record it before
        // the stale-claim sweep below can see an unknown id.
        self.note_presence(player_id.clone());
        let players = self.store.players();
        if let Some(previous) = players
            .iter()
            .position(|slot| !slot.claimed_id.is_empty() && slot.claimed_id == player_id)
        {
            if Some(previous) != seat {
                self.set_slot_claim(previous, PlayerId::default());
            }
        }
        if let Some(seat) = seat {
            if seat >= players.len() {
                return;
            }
            self.set_slot_claim(seat, player_id.clone());
        }
        self.handle_ping(Some((true, player_id, None)));
    }

    /// Writes a seat's claimed id and broadcasts the change
    pub(super) fn set_slot_claim(&mut self, seat: usize, id: PlayerId) {
        self.store.apply(Mutation::UpdateSlot {
            seat,
            field: SlotField::ClaimedId(id.clone()),
        });
        self.send_player(seat, &SlotField::ClaimedId(id));
    }

    /// Requests a seat from the host; `None` vacates (spectator only)
    pub fn claim_seat(&mut self, seat: Option<usize>) {
        if !self.role.is_spectator() {
            return;
        }
        if let Some(seat) = seat {
            if seat >= self.store.players().len() {
                return;
            }
        }
        self.send(Command::Claim {
            seat,
            player_id: self.store.player_id(),
        });
    }
}
