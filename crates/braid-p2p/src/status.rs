use std::collections::BTreeMap;
use std::sync::Arc;

use braid_core::PeerId;
use parking_lot::Mutex;

use crate::sync::SyncState;

/// Sync state of every connection that finished its handshake, keyed by the
/// verified peer id. Cheap to clone; all clones share one table.
#[derive(Clone, Default)]
pub struct SyncStatus {
    peers: Arc<Mutex<BTreeMap<PeerId, SyncState>>>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly verified peer. Returns false if it is already
    /// connected, in which case the table is left unchanged.
    pub(crate) fn register(&self, peer: PeerId, state: SyncState) -> bool {
        let mut peers = self.peers.lock();
        if peers.contains_key(&peer) {
            return false;
        }
        peers.insert(peer, state);
        true
    }

    pub(crate) fn update(&self, peer: PeerId, state: SyncState) {
        if let Some(entry) = self.peers.lock().get_mut(&peer) {
            *entry = state;
        }
    }

    pub(crate) fn remove(&self, peer: &PeerId) {
        self.peers.lock().remove(peer);
    }

    /// Current state per connected peer.
    pub fn peers(&self) -> Vec<(PeerId, SyncState)> {
        self.peers.lock().iter().map(|(p, s)| (*p, *s)).collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn synced_peers(&self) -> usize {
        self.peers
            .lock()
            .values()
            .filter(|s| **s == SyncState::Synced)
            .count()
    }

    /// The node counts as synced once at least one peer reports matching
    /// tips. A node with no peers is not synced.
    pub fn is_synced(&self) -> bool {
        self.synced_peers() > 0
    }
}
