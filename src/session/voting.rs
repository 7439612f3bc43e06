// Voting and nomination coordination.
//
// A round runs from nomination to lock: the host opens it (rebroadcasting
// the voting speed first so every device times the round identically),
// seats cast votes in rotation starting one past the nominee, and the host
// walks a lock pointer around that rotation finalizing seats one at a time.
// Once the pointer has passed a seat, only the host may change its vote.
//
// The rotation arithmetic lives in two small functions so the tie-break
// rule is testable on its own.

use serde_json::Value;
use tracing::debug;

use crate::core::{Nomination, VoteValue};
use crate::protocol::Command;
use crate::store::Mutation;
use super::Session;

/// Position of `seat` in the rotation that starts one seat after the
/// nominee and wraps modulo the roster length.
pub(crate) fn rotation_index(seat: usize, nominee: usize, roster: usize) -> usize {
    (seat + roster - 1 - nominee) % roster
}

/// Seat sitting at the lock boundary once `locked` seats are finalized.
pub(crate) fn boundary_seat(nominee: usize, locked: usize, roster: usize) -> usize {
    (nominee + locked.saturating_sub(1)) % roster
}

impl Session {
    /// Opens a new vote round, or clears the current one (host only).
    ///
    /// Both seats must be inside the roster unless the nomination is being
    /// cleared. The current voting speed is rebroadcast first.
    pub fn nominate(&mut self, nomination: Option<Nomination>) {
        if self.role.is_spectator() {
            return;
        }
        let roster = self.store.players().len();
        if let Some(nomination) = nomination {
            if nomination.nominator >= roster || nomination.nominee >= roster {
                debug!("discarding out-of-roster nomination");
                return;
            }
        }
        self.set_voting_speed(self.store.voting_speed());
        self.store.apply(Mutation::SetNomination {
            nomination,
            votes: None,
            voting_speed: None,
            locked: None,
        });
        self.send(Command::Nomination(nomination));
    }

    /// Broadcasts the voting speed in seconds (host only, zero ignored)
    pub fn set_voting_speed(&mut self, seconds: u64) {
        if self.role.is_spectator() || seconds == 0 {
            return;
        }
        self.store.apply(Mutation::SetVotingSpeed(seconds));
        self.send(Command::VotingSpeed(seconds));
    }

    /// Records a vote and transmits it if this device may speak for the
    /// seat: spectators only for the seat their own id claims, the host
    /// for any seat.
    pub fn cast_vote(&mut self, seat: usize, value: VoteValue) {
        let players = self.store.players();
        let Some(slot) = players.get(seat) else {
            return;
        };
        if self.role.is_spectator() {
            let own_seat =
                !slot.claimed_id.is_empty() && slot.claimed_id == self.store.player_id();
            if !own_seat {
                return;
            }
        }
        self.store.apply(Mutation::Vote { seat, value });
        self.send(Command::Vote {
            seat,
            value: value.to_wire(),
            from_host: !self.role.is_spectator(),
        });
    }

    /// Applies an incoming vote, subject to the rotation rule.
    ///
    /// Host-originated votes always land; anyone else's only while the lock
    /// pointer has not passed their position in the rotation.
    pub(super) fn apply_vote(&mut self, seat: usize, value: Option<bool>, from_host: bool) {
        let Some(nomination) = self.store.nomination() else {
            return;
        };
        let roster = self.store.players().len();
        if roster == 0 || seat >= roster || nomination.nominee >= roster {
            return;
        }
        let adjusted = rotation_index(seat, nomination.nominee, roster);
        if from_host || adjusted + 1 >= self.store.locked_count() {
            self.store.apply(Mutation::Vote {
                seat,
                value: VoteValue::from_wire(value),
            });
        }
    }

    /// Finalizes the next seat in rotation and broadcasts it (host only)
    pub fn lock_vote(&mut self) {
        if self.role.is_spectator() {
            return;
        }
        let Some(nomination) = self.store.nomination() else {
            return;
        };
        let roster = self.store.players().len();
        if roster == 0 || nomination.nominee >= roster {
            return;
        }
        let locked = self.store.locked_count() + 1;
        self.store.apply(Mutation::SetLockedCount(locked));
        let boundary = boundary_seat(nomination.nominee, locked, roster);
        let vote = self.store.votes().get(boundary).copied().unwrap_or_default();
        self.send(Command::Lock {
            locked,
            vote: vote.to_wire(),
        });
    }

    /// Applies a lock broadcast, reconciling the boundary seat's vote.
    ///
    /// A vote that raced the lock on the wire is overwritten with the value
    /// the host locked in.
    pub(super) fn apply_lock(&mut self, locked: usize, vote: Option<bool>) {
        self.store.apply(Mutation::SetLockedCount(locked));
        if locked <= 1 {
            return;
        }
        let Some(nomination) = self.store.nomination() else {
            return;
        };
        let roster = self.store.players().len();
        if roster == 0 || nomination.nominee >= roster {
            return;
        }
        let boundary = boundary_seat(nomination.nominee, locked, roster);
        let incoming = VoteValue::from_wire(vote);
        if self.store.votes().get(boundary).copied() != Some(incoming) {
            self.store.apply(Mutation::Vote {
                seat: boundary,
                value: incoming,
            });
        }
    }

    pub(super) fn apply_swap(&mut self, payload: Value) {
        if !self.role.is_spectator() {
            return;
        }
        if let Ok((a, b)) = serde_json::from_value::<(usize, usize)>(payload) {
            self.store.apply(Mutation::SwapSeats(a, b));
        }
    }

    pub(super) fn apply_move(&mut self, payload: Value) {
        if !self.role.is_spectator() {
            return;
        }
        if let Ok((from, to)) = serde_json::from_value::<(usize, usize)>(payload) {
            self.store.apply(Mutation::MoveSeat { from, to });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::{host_session, spectator_session};
    use super::*;
    use crate::store::{RoleTable, SlotField};

    #[test]
    fn test_rotation_starts_after_nominee() {
        // Roster of 5, nominee in seat 2: rotation is 3, 4, 0, 1, 2.
        assert_eq!(rotation_index(3, 2, 5), 0);
        assert_eq!(rotation_index(4, 2, 5), 1);
        assert_eq!(rotation_index(0, 2, 5), 2);
        assert_eq!(rotation_index(1, 2, 5), 3);
        assert_eq!(rotation_index(2, 2, 5), 4);
    }

    #[test]
    fn test_boundary_seat_walks_the_rotation() {
        assert_eq!(boundary_seat(1, 3, 4), 3);
        assert_eq!(boundary_seat(2, 1, 5), 2);
        assert_eq!(boundary_seat(4, 2, 5), 0);
    }

    #[test]
    fn test_nominate_resets_round_and_rebroadcasts_speed() {
        let (mut session, net, _clock) = host_session(&["A", "B", "C"], RoleTable::empty());
        session.store.apply(Mutation::Vote {
            seat: 0,
            value: VoteValue::Yes,
        });
        net.clear_sent();
        session.nominate(Some(Nomination::new(0, 1)));

        assert_eq!(session.store().nomination(), Some(Nomination::new(0, 1)));
        assert_eq!(session.store().locked_count(), 0);
        assert!(session.store().votes().iter().all(|v| *v == VoteValue::Unset));
        let commands = net.sent_commands();
        assert!(matches!(commands[0], Command::VotingSpeed(3)));
        assert!(matches!(commands[1], Command::Nomination(Some(_))));
    }

    #[test]
    fn test_nominate_rejects_out_of_roster_seats() {
        let (mut session, net, _clock) = host_session(&["A", "B"], RoleTable::empty());
        net.clear_sent();
        session.nominate(Some(Nomination::new(0, 5)));
        assert_eq!(session.store().nomination(), None);
        assert!(net.sent_frames().is_empty());
    }

    #[test]
    fn test_clearing_nomination_is_always_valid() {
        let (mut session, net, _clock) = host_session(&["A", "B"], RoleTable::empty());
        session.nominate(Some(Nomination::new(0, 1)));
        net.clear_sent();
        session.nominate(None);
        assert_eq!(session.store().nomination(), None);
        let commands = net.sent_commands();
        assert!(commands.contains(&Command::Nomination(None)));
    }

    #[test]
    fn test_spectator_casts_only_its_own_seat() {
        let (mut session, net, _clock) = spectator_session(RoleTable::empty());
        let me = session.store().player_id();
        for name in ["A", "B"] {
            session.store.apply(Mutation::AddPlayer(name.to_string()));
        }
        session.store.apply(Mutation::UpdateSlot {
            seat: 1,
            field: SlotField::ClaimedId(me),
        });
        session.store.apply(Mutation::SetNomination {
            nomination: Some(Nomination::new(0, 0)),
            votes: None,
            voting_speed: None,
            locked: None,
        });
        net.clear_sent();

        // Not our seat: nothing applied, nothing sent.
        session.cast_vote(0, VoteValue::Yes);
        assert!(net.sent_frames().is_empty());
        assert_eq!(session.store().votes()[0], VoteValue::Unset);

        // Our seat: applied and sent, marked as a player cast.
        session.cast_vote(1, VoteValue::Yes);
        assert_eq!(session.store().votes()[1], VoteValue::Yes);
        let commands = net.sent_commands();
        assert_eq!(
            commands,
            vec![Command::Vote {
                seat: 1,
                value: Some(true),
                from_host: false,
            }]
        );
    }

    #[test]
    fn test_host_casts_any_seat() {
        let (mut session, net, _clock) = host_session(&["A", "B", "C"], RoleTable::empty());
        session.nominate(Some(Nomination::new(0, 1)));
        net.clear_sent();
        session.cast_vote(2, VoteValue::No);
        assert_eq!(session.store().votes()[2], VoteValue::No);
        let commands = net.sent_commands();
        assert_eq!(
            commands,
            vec![Command::Vote {
                seat: 2,
                value: Some(false),
                from_host: true,
            }]
        );
    }

    #[test]
    fn test_vote_apply_respects_lock_pointer() {
        let (mut session, net, _clock) = spectator_session(RoleTable::empty());
        for name in ["A", "B", "C", "D", "E"] {
            session.store.apply(Mutation::AddPlayer(name.to_string()));
        }
        session.store.apply(Mutation::SetNomination {
            nomination: Some(Nomination::new(0, 2)),
            votes: None,
            voting_speed: None,
            locked: Some(3),
        });

        // Seat 3 is first in rotation (adjusted 0); the pointer has passed it.
        net.push_frame("[\"vote\",[3,true,false]]");
        session.pump();
        assert_eq!(session.store().votes()[3], VoteValue::Unset);

        // Seat 0 (adjusted 2) is still open.
        net.push_frame("[\"vote\",[0,true,false]]");
        session.pump();
        assert_eq!(session.store().votes()[0], VoteValue::Yes);

        // The host may override a passed seat.
        net.push_frame("[\"vote\",[3,true,true]]");
        session.pump();
        assert_eq!(session.store().votes()[3], VoteValue::Yes);
    }

    #[test]
    fn test_vote_without_nomination_is_discarded() {
        let (mut session, net, _clock) = spectator_session(RoleTable::empty());
        session.store.apply(Mutation::AddPlayer("A".into()));
        net.push_frame("[\"vote\",[0,true,false]]");
        session.pump();
        assert_eq!(session.store().votes()[0], VoteValue::Unset);
    }

    #[test]
    fn test_lock_vote_broadcasts_boundary_value() {
        let (mut session, net, _clock) = host_session(&["A", "B", "C", "D"], RoleTable::empty());
        session.nominate(Some(Nomination::new(0, 1)));
        session.cast_vote(2, VoteValue::Yes);
        net.clear_sent();

        session.lock_vote();
        session.lock_vote();
        assert_eq!(session.store().locked_count(), 2);
        let commands = net.sent_commands();
        assert_eq!(
            commands,
            vec![
                Command::Lock {
                    locked: 1,
                    vote: None,
                },
                // Boundary for lock 2 is seat 2, which voted yes.
                Command::Lock {
                    locked: 2,
                    vote: Some(true),
                },
            ]
        );
    }

    #[test]
    fn test_lock_apply_reconciles_raced_vote() {
        let (mut session, net, _clock) = spectator_session(RoleTable::empty());
        for name in ["A", "B", "C", "D"] {
            session.store.apply(Mutation::AddPlayer(name.to_string()));
        }
        session.store.apply(Mutation::SetNomination {
            nomination: Some(Nomination::new(0, 1)),
            votes: None,
            voting_speed: None,
            locked: None,
        });
        // A local vote at the future boundary seat that the host never saw.
        session.store.apply(Mutation::Vote {
            seat: 3,
            value: VoteValue::No,
        });

        net.push_frame("[\"lock\",[3,true]]");
        session.pump();
        assert_eq!(session.store().locked_count(), 3);
        // Boundary seat (1 + 3 - 1) % 4 == 3 is overwritten.
        assert_eq!(session.store().votes()[3], VoteValue::Yes);
    }

    #[test]
    fn test_lock_of_one_does_not_touch_votes() {
        let (mut session, net, _clock) = spectator_session(RoleTable::empty());
        for name in ["A", "B"] {
            session.store.apply(Mutation::AddPlayer(name.to_string()));
        }
        session.store.apply(Mutation::SetNomination {
            nomination: Some(Nomination::new(0, 1)),
            votes: None,
            voting_speed: None,
            locked: None,
        });
        session.store.apply(Mutation::Vote {
            seat: 1,
            value: VoteValue::No,
        });
        net.push_frame("[\"lock\",[1,true]]");
        session.pump();
        assert_eq!(session.store().locked_count(), 1);
        assert_eq!(session.store().votes()[1], VoteValue::No);
    }

    #[test]
    fn test_spectator_applies_relayed_seating_changes() {
        let (mut session, net, _clock) = spectator_session(RoleTable::empty());
        for name in ["A", "B", "C"] {
            session.store.apply(Mutation::AddPlayer(name.to_string()));
        }
        net.push_frame("[\"swap\",[0,2]]");
        session.pump();
        let names: Vec<_> = session.store().players().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["C", "B", "A"]);

        net.push_frame("[\"move\",[2,0]]");
        session.pump();
        let names: Vec<_> = session.store().players().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_host_relays_seating_edits_verbatim() {
        let (mut session, net, _clock) = host_session(&["A", "B", "C"], RoleTable::empty());
        net.clear_sent();
        session.apply_local(Mutation::SwapSeats(0, 2));
        session.apply_local(Mutation::MoveSeat { from: 1, to: 0 });
        let frames = net.sent_frames();
        assert_eq!(frames[0], "[\"swap\",[0,2]]");
        assert_eq!(frames[1], "[\"move\",[1,0]]");
    }
}
