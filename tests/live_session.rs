// End-to-end scenarios: a host and a spectator engine talking through the
// in-process relay, with hand-driven clocks so heartbeat timing is exact.

use std::sync::Arc;

use conclave::core::{ConnectionState, ManualClock, Nomination, SessionConfig, VoteValue};
use conclave::network::LocalRelay;
use conclave::session::Session;
use conclave::store::{MemoryStore, Mutation, RoleTable};

fn host_session(relay: &LocalRelay, names: &[&str]) -> (Session, ManualClock) {
    let mut store = MemoryStore::host();
    store.seed_players(names);
    build(relay, Box::new(store))
}

fn spectator_session(relay: &LocalRelay) -> (Session, ManualClock) {
    build(relay, Box::new(MemoryStore::spectator()))
}

fn build(relay: &LocalRelay, store: Box<MemoryStore>) -> (Session, ManualClock) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let clock = ManualClock::new();
    let session = Session::with_config(
        SessionConfig::default(),
        Box::new(relay.endpoint()),
        store,
        Arc::new(RoleTable::empty()),
        Box::new(clock.clone()),
    );
    (session, clock)
}

/// Ping-pongs pending frames until both sides settle.
fn settle(host: &mut Session, spectator: &mut Session) {
    for _ in 0..4 {
        host.pump();
        spectator.pump();
    }
}

#[test]
fn spectator_converges_to_host_snapshot() {
    let relay = LocalRelay::new();
    let (mut host, _) = host_session(&relay, &["A"]);
    let (mut spectator, _) = spectator_session(&relay);
    host.apply_local(Mutation::SetVotingSpeed(20));

    host.connect("lunar").unwrap();
    host.pump();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);

    assert_eq!(host.connection_state(), ConnectionState::Connected);
    assert_eq!(spectator.connection_state(), ConnectionState::Connected);

    let players = spectator.store().players();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].name, "A");
    assert!(!players[0].is_dead);
    assert_eq!(spectator.store().nomination(), None);
    assert_eq!(spectator.store().voting_speed(), 20);

    // Both sides see one remote participant.
    assert_eq!(host.store().player_count(), 1);
    assert_eq!(spectator.store().player_count(), 1);
}

#[test]
fn roster_edits_propagate_live() {
    let relay = LocalRelay::new();
    let (mut host, _) = host_session(&relay, &["A", "B"]);
    let (mut spectator, _) = spectator_session(&relay);
    host.connect("lunar").unwrap();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);

    host.apply_local(Mutation::AddPlayer("C".into()));
    settle(&mut host, &mut spectator);
    assert_eq!(spectator.store().players().len(), 3);

    host.apply_local(Mutation::RemovePlayer(0));
    settle(&mut host, &mut spectator);
    let names: Vec<_> = spectator
        .store()
        .players()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["B", "C"]);
}

#[test]
fn seat_claim_round_trips_through_the_host() {
    let relay = LocalRelay::new();
    let (mut host, _) = host_session(&relay, &["A", "B"]);
    let (mut spectator, _) = spectator_session(&relay);
    host.connect("lunar").unwrap();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);

    spectator.claim_seat(Some(1));
    settle(&mut host, &mut spectator);

    let me = spectator.store().player_id();
    assert_eq!(host.store().players()[1].claimed_id, me);
    // The confirmation came back down as a player update.
    assert_eq!(spectator.store().players()[1].claimed_id, me);
}

#[test]
fn nomination_vote_and_lock_converge() {
    let relay = LocalRelay::new();
    let (mut host, _) = host_session(&relay, &["A", "B", "C", "D"]);
    let (mut spectator, _) = spectator_session(&relay);
    host.connect("lunar").unwrap();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);
    spectator.claim_seat(Some(2));
    settle(&mut host, &mut spectator);

    host.nominate(Some(Nomination::new(0, 1)));
    settle(&mut host, &mut spectator);
    assert_eq!(spectator.store().nomination(), Some(Nomination::new(0, 1)));
    assert_eq!(spectator.store().votes().len(), 4);

    // The seated spectator votes for itself; the host sees it land.
    spectator.cast_vote(2, VoteValue::Yes);
    settle(&mut host, &mut spectator);
    assert_eq!(host.store().votes()[2], VoteValue::Yes);

    // The host walks the lock past that seat; both sides agree.
    host.lock_vote();
    host.lock_vote();
    settle(&mut host, &mut spectator);
    assert_eq!(host.store().locked_count(), 2);
    assert_eq!(spectator.store().locked_count(), 2);
    assert_eq!(spectator.store().votes()[2], VoteValue::Yes);

    // A fresh nomination resets the round everywhere.
    host.nominate(Some(Nomination::new(1, 3)));
    settle(&mut host, &mut spectator);
    assert_eq!(spectator.store().locked_count(), 0);
    assert!(spectator
        .store()
        .votes()
        .iter()
        .all(|v| *v == VoteValue::Unset));
}

#[test]
fn silent_spectator_is_evicted_and_unseated() {
    let relay = LocalRelay::new();
    let (mut host, host_clock) = host_session(&relay, &["A"]);
    let (mut spectator, _) = spectator_session(&relay);
    host.connect("lunar").unwrap();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);
    spectator.claim_seat(Some(0));
    settle(&mut host, &mut spectator);
    assert_eq!(host.store().player_count(), 1);

    // The spectator goes silent; two heartbeat intervals later the host
    // evicts it and frees the seat.
    host_clock.advance(30_000);
    host.pump();
    assert_eq!(host.store().player_count(), 1);

    host_clock.advance(30_001);
    host.pump();
    assert_eq!(host.store().player_count(), 0);
    assert!(host.store().players()[0].claimed_id.is_empty());
}

#[test]
fn departing_spectator_says_goodbye() {
    let relay = LocalRelay::new();
    let (mut host, _) = host_session(&relay, &["A"]);
    let (mut spectator, _) = spectator_session(&relay);
    host.connect("lunar").unwrap();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);
    assert_eq!(host.store().player_count(), 1);

    spectator.disconnect();
    host.pump();
    assert_eq!(host.store().player_count(), 0);
    assert_eq!(spectator.store().session_id(), None);
}

#[test]
fn relay_outage_triggers_fixed_delay_reconnect() {
    let relay = LocalRelay::new();
    let (mut host, _) = host_session(&relay, &["A"]);
    let (mut spectator, clock) = spectator_session(&relay);
    host.connect("lunar").unwrap();
    spectator.connect("lunar").unwrap();
    settle(&mut host, &mut spectator);

    relay.sever("lunar", false, None);
    spectator.pump();
    assert_eq!(spectator.connection_state(), ConnectionState::Reconnecting);
    assert!(spectator.store().reconnecting());

    clock.advance(3_000);
    spectator.pump();
    settle(&mut host, &mut spectator);
    assert_eq!(spectator.connection_state(), ConnectionState::Connected);
    assert!(!spectator.store().reconnecting());
    // The snapshot request after reopening restored the roster.
    assert_eq!(spectator.store().players().len(), 1);
}
