// Peer presence and latency bookkeeping.
//
// Peers exist only as heartbeat receipts: an entry is created on the first
// ping from an id, refreshed on every one after that, and evicted once the
// id has been silent for two heartbeat intervals. Latency samples ride on
// the same pings; the session decides what to do with them by role.

use std::collections::HashMap;
use std::time::Duration;

use crate::core::{PlayerId, MAX_LATENCY_MS};

/// Liveness entry for one remote participant.
#[derive(Clone, Debug)]
pub(super) struct Peer {
    pub last_seen_ms: u64,
    pub latency_ms: Option<u64>,
}

/// Tracks which peers are alive and what their latency looks like.
pub(super) struct PresenceTracker {
    peers: HashMap<PlayerId, Peer>,
    interval_ms: u64,
}

impl PresenceTracker {
    pub fn new(heartbeat_interval: Duration) -> Self {
        PresenceTracker {
            peers: HashMap::new(),
            interval_ms: heartbeat_interval.as_millis() as u64,
        }
    }

    /// Forgets every peer and latency sample
    pub fn reset(&mut self) {
        self.peers.clear();
    }

    /// Evicts peers silent for more than two heartbeat intervals.
    ///
    /// Returns the evicted ids.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<PlayerId> {
        let deadline = self.interval_ms * 2;
        let stale: Vec<PlayerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| now_ms.saturating_sub(peer.last_seen_ms) > deadline)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }

    /// Creates or refreshes a peer entry
    pub fn record(&mut self, id: PlayerId, now_ms: u64) {
        self.peers
            .entry(id)
            .and_modify(|peer| peer.last_seen_ms = now_ms)
            .or_insert(Peer {
                last_seen_ms: now_ms,
                latency_ms: None,
            });
    }

    /// Stores a latency sample for a known peer
    pub fn record_latency(&mut self, id: &PlayerId, ms: u64) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.latency_ms = Some(ms);
        }
    }

    /// Arithmetic mean of the held latency samples, rounded
    pub fn mean_latency(&self) -> Option<u64> {
        let samples: Vec<u64> = self.peers.values().filter_map(|peer| peer.latency_ms).collect();
        if samples.is_empty() {
            return None;
        }
        let sum: u64 = samples.iter().sum();
        Some((sum as f64 / samples.len() as f64).round() as u64)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn remove(&mut self, id: &PlayerId) {
        self.peers.remove(id);
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }
}

/// Validates a raw latency field; only samples in (0, 30000) ms count.
pub(super) fn accept_latency(value: i64) -> Option<u64> {
    (value > 0 && (value as u64) < MAX_LATENCY_MS).then_some(value as u64)
}
