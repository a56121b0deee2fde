use std::sync::Arc;

use braid_core::{BraidError, Timestamp, Vertex};
use braid_crypto::PeerKeyPair;
use braid_genesis::NetworkParams;
use braid_state::{AcceptOutcome, PubSub, ValidationEngine};
use parking_lot::Mutex;

use crate::config::SyncConfig;

/// Current UTC time in Unix seconds.
pub fn unix_now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// Handles shared by every component of one node, built once at startup and
/// cloned into each connection.
///
/// All ledger mutation goes through `engine`'s mutex, so acceptances from
/// different connections never interleave.
#[derive(Clone)]
pub struct NodeContext {
    pub engine: Arc<Mutex<ValidationEngine>>,
    pub pubsub: Arc<PubSub>,
    pub identity: Arc<PeerKeyPair>,
    pub params: Arc<NetworkParams>,
    pub config: Arc<SyncConfig>,
}

impl NodeContext {
    pub fn new(engine: ValidationEngine, identity: PeerKeyPair, config: SyncConfig) -> Self {
        let pubsub = engine.pubsub().clone();
        let params = Arc::new(engine.params().clone());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            pubsub,
            identity: Arc::new(identity),
            params,
            config: Arc::new(config),
        }
    }

    /// Submit a locally produced vertex. Accepted vertices are relayed to
    /// every connected peer through the event fan-out.
    pub fn submit(&self, vertex: Vertex) -> Result<AcceptOutcome, BraidError> {
        self.engine.lock().accept(vertex, unix_now())
    }
}
