// Async shell around the session engine.
//
// The engine itself is synchronous and event-driven; `SessionDriver` owns
// it inside a tokio task, pumps transport events and timer deadlines on a
// short interval, and accepts engine operations from any number of
// cloneable `SessionHandle`s. UI or CLI layers hold a handle and never
// touch the engine directly, which keeps every handler running to
// completion before the next event is processed.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::core::{Error, Nomination, Result, VoteValue};
use crate::session::Session;
use crate::store::Mutation;

/// Engine operations a handle may submit.
enum DriverCommand {
    Connect(String),
    Disconnect,
    ClaimSeat(Option<usize>),
    Nominate(Option<Nomination>),
    SetVotingSpeed(u64),
    CastVote { seat: usize, value: VoteValue },
    LockVote,
    Apply(Mutation),
    Shutdown,
}

/// Cloneable handle for driving a running [`SessionDriver`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<DriverCommand>,
}

impl SessionHandle {
    fn submit(&self, command: DriverCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::invalid_state("session driver has stopped"))
    }

    /// Connect to the given channel
    pub fn connect(&self, channel: &str) -> Result<()> {
        self.submit(DriverCommand::Connect(channel.to_string()))
    }

    /// Close the current session, if any
    pub fn disconnect(&self) -> Result<()> {
        self.submit(DriverCommand::Disconnect)
    }

    /// Request a seat; `None` vacates the currently held one
    pub fn claim_seat(&self, seat: Option<usize>) -> Result<()> {
        self.submit(DriverCommand::ClaimSeat(seat))
    }

    /// Start or clear a nomination (host only)
    pub fn nominate(&self, nomination: Option<Nomination>) -> Result<()> {
        self.submit(DriverCommand::Nominate(nomination))
    }

    /// Broadcast the voting speed (host only)
    pub fn set_voting_speed(&self, seconds: u64) -> Result<()> {
        self.submit(DriverCommand::SetVotingSpeed(seconds))
    }

    /// Record and transmit a vote for the given seat
    pub fn cast_vote(&self, seat: usize, value: VoteValue) -> Result<()> {
        self.submit(DriverCommand::CastVote { seat, value })
    }

    /// Advance the vote lock by one seat (host only)
    pub fn lock_vote(&self) -> Result<()> {
        self.submit(DriverCommand::LockVote)
    }

    /// Apply a local state edit, broadcasting whatever the role allows
    pub fn apply(&self, mutation: Mutation) -> Result<()> {
        self.submit(DriverCommand::Apply(mutation))
    }

    /// Stop the driver after disconnecting cleanly
    pub fn shutdown(&self) -> Result<()> {
        self.submit(DriverCommand::Shutdown)
    }
}

/// Runs a [`Session`] with live timers inside a tokio task.
pub struct SessionDriver {
    session: Session,
    rx: UnboundedReceiver<DriverCommand>,
    poll_interval: Duration,
}

impl SessionDriver {
    /// Wraps a session, returning the driver and a handle for it
    pub fn new(session: Session) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionDriver {
                session,
                rx,
                poll_interval: Duration::from_millis(50),
            },
            SessionHandle { tx },
        )
    }

    /// Overrides how often transport events and deadlines are pumped
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs until shutdown or until every handle is dropped.
    ///
    /// Returns the session so callers can inspect its final state.
    pub async fn run(mut self) -> Session {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.session.pump(),
                command = self.rx.recv() => match command {
                    None | Some(DriverCommand::Shutdown) => {
                        self.session.disconnect();
                        break;
                    }
                    Some(command) => self.handle(command),
                },
            }
            for notice in self.session.take_notices() {
                info!("session notice: {notice}");
            }
        }
        self.session
    }

    fn handle(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Connect(channel) => {
                if let Err(err) = self.session.connect(&channel) {
                    warn!("connect failed: {err}");
                }
            }
            DriverCommand::Disconnect => self.session.disconnect(),
            DriverCommand::ClaimSeat(seat) => self.session.claim_seat(seat),
            DriverCommand::Nominate(nomination) => self.session.nominate(nomination),
            DriverCommand::SetVotingSpeed(seconds) => self.session.set_voting_speed(seconds),
            DriverCommand::CastVote { seat, value } => self.session.cast_vote(seat, value),
            DriverCommand::LockVote => self.session.lock_vote(),
            DriverCommand::Apply(mutation) => self.session.apply_local(mutation),
            DriverCommand::Shutdown => unreachable!("handled by the run loop"),
        }
    }
}
