// Protocol messages exchanged between session participants.
//
// One enum defines the full protocol vocabulary: every frame on the wire is
// a `[command, payload]` pair, and `Command` is the decoded form of that
// pair. Host and spectator share the vocabulary; role gating happens in the
// dispatch handlers, not in the message layer.
//
// Supporting payload structs carry the `camelCase` field names the wire
// uses. Seat-reorder payloads (`Swap`, `Move`) stay opaque `Value`s — the
// engine relays them verbatim and leaves interpretation to the state
// store's mutation handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Nomination, PlayerId, RoleId};

/// Decoded wire commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Ask the host to publish a full snapshot.
    GamestateRequest,
    /// Edition identifier, with the full role list for custom editions.
    Edition(EditionUpdate),
    /// Fabled role ids currently in play.
    Fabled(Vec<RoleId>),
    /// Full roster/nomination/vote snapshot.
    Gamestate(GamestatePayload),
    /// Single-field update for one seat.
    Player(PlayerUpdate),
    /// Seat-claim request; `None` vacates any currently held seat.
    Claim {
        seat: Option<usize>,
        player_id: PlayerId,
    },
    /// Heartbeat carrying presence and a latency sample.
    Ping {
        is_spectator: bool,
        player_id: PlayerId,
        latency: LatencyField,
    },
    /// Start a new vote round, or clear the current one.
    Nomination(Option<Nomination>),
    /// Voting speed in seconds.
    VotingSpeed(u64),
    /// One seat's vote cast.
    Vote {
        seat: usize,
        value: Option<bool>,
        from_host: bool,
    },
    /// Advance the vote lock to `locked` finalized seats.
    Lock {
        locked: usize,
        vote: Option<bool>,
    },
    /// Exchange two seats (opaque payload).
    Swap(Value),
    /// Move a seat to another position (opaque payload).
    Move(Value),
    /// A participant is leaving the session.
    Bye(PlayerId),
}

impl Command {
    /// Wire name of this command
    pub fn name(&self) -> &'static str {
        match self {
            Command::GamestateRequest => "req",
            Command::Edition(_) => "edition",
            Command::Fabled(_) => "fabled",
            Command::Gamestate(_) => "gs",
            Command::Player(_) => "player",
            Command::Claim { .. } => "claim",
            Command::Ping { .. } => "ping",
            Command::Nomination(_) => "nomination",
            Command::VotingSpeed(_) => "votingSpeed",
            Command::Vote { .. } => "vote",
            Command::Lock { .. } => "lock",
            Command::Swap(_) => "swap",
            Command::Move(_) => "move",
            Command::Bye(_) => "bye",
        }
    }
}

/// Wire summary of one roster slot.
///
/// `role_id` is present only while the seat holds a traveler role; every
/// other role stays host-local and is withheld from the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub name: String,
    pub id: PlayerId,
    pub is_dead: bool,
    pub is_voteless: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
}

/// Payload of a full snapshot frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamestatePayload {
    pub gamestate: Vec<SlotSummary>,
    pub nomination: Option<Nomination>,
    pub voting_speed: u64,
    pub locked_vote: usize,
    /// Per-seat votes, carried only while a nomination is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<Vec<Option<bool>>>,
}

/// Payload of a single-field player update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub index: usize,
    pub property: SlotProperty,
    pub value: Value,
}

/// Which slot field a [`PlayerUpdate`] touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotProperty {
    Name,
    Id,
    IsDead,
    IsVoteless,
    Role,
}

/// Payload of an edition update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditionUpdate {
    pub edition: String,
    /// Full role definitions, sent only for the custom edition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Value>>,
}

/// Third element of a ping frame: either a measured round-trip in
/// milliseconds, or the placeholder tag a sender stamps on its own pings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LatencyField {
    Millis(i64),
    Tag(String),
}

impl LatencyField {
    /// Returns the measured sample, if this field carries one
    pub fn millis(&self) -> Option<i64> {
        match self {
            LatencyField::Millis(ms) => Some(*ms),
            LatencyField::Tag(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_summary_field_names() {
        let summary = SlotSummary {
            name: "Ayla".into(),
            id: PlayerId::from("abc"),
            is_dead: false,
            is_voteless: true,
            role_id: None,
        };
        let encoded = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"name": "Ayla", "id": "abc", "isDead": false, "isVoteless": true})
        );
    }

    #[test]
    fn test_slot_summary_carries_traveler_role() {
        let summary = SlotSummary {
            name: "Bez".into(),
            id: PlayerId::default(),
            is_dead: false,
            is_voteless: false,
            role_id: Some(RoleId::from("wayfarer")),
        };
        let encoded = serde_json::to_value(&summary).unwrap();
        assert_eq!(encoded["roleId"], "wayfarer");
    }

    #[test]
    fn test_slot_property_wire_names() {
        assert_eq!(
            serde_json::to_string(&SlotProperty::IsVoteless).unwrap(),
            "\"isVoteless\""
        );
        let property: SlotProperty = serde_json::from_str("\"isDead\"").unwrap();
        assert_eq!(property, SlotProperty::IsDead);
    }

    #[test]
    fn test_latency_field_untagged() {
        let tag: LatencyField = serde_json::from_str("\"latency\"").unwrap();
        assert_eq!(tag.millis(), None);
        let sample: LatencyField = serde_json::from_str("125").unwrap();
        assert_eq!(sample.millis(), Some(125));
    }

    #[test]
    fn test_gamestate_payload_omits_votes_outside_a_round() {
        let payload = GamestatePayload {
            gamestate: vec![],
            nomination: None,
            voting_speed: 20,
            locked_vote: 0,
            votes: None,
        };
        let encoded = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"gamestate": [], "nomination": null, "votingSpeed": 20, "lockedVote": 0})
        );
    }
}
