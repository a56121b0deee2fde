use std::time::Duration;

use braid_core::constants::{MAX_BLOCKS_PER_BATCH, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};

/// Configuration for peer connections and the per-connection sync protocol.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local TCP listen address (e.g. "0.0.0.0:7777").
    pub listen_addr: String,
    /// Peers dialled at startup ("host:port").
    pub bootstrap_peers: Vec<String>,
    /// Protocol version advertised in HELLO; peers must match exactly.
    pub protocol_version: u32,
    /// Block ids asked for per GET-BLOCKS-BEFORE.
    pub blocks_per_batch: u32,
    /// Outstanding GET-DATA requests per connection.
    pub max_in_flight: usize,
    /// How long a request may go unanswered before it is re-sent.
    pub request_timeout: Duration,
    /// Re-sends per request before the peer is dropped.
    pub max_retries: u32,
    /// GET-TIPS interval while reconciling.
    pub tips_poll_interval: Duration,
    /// GET-TIPS interval once synced.
    pub synced_poll_interval: Duration,
    /// Vertex ids remembered per peer to suppress redundant relays.
    pub known_cache_size: usize,
    /// Vertices buffered per connection while their dependencies are
    /// fetched. When full, the orphan furthest from the local DAG is evicted
    /// and fetched again once the rest has been accepted.
    pub max_orphans: usize,
    /// Largest accepted frame on the wire.
    pub max_frame_size: usize,
    /// How often each connection task ticks its sync manager.
    pub tick_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7777".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: PROTOCOL_VERSION,
            blocks_per_batch: MAX_BLOCKS_PER_BATCH,
            max_in_flight: 64,
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            tips_poll_interval: Duration::from_secs(2),
            synced_poll_interval: Duration::from_secs(30),
            known_cache_size: 16_384,
            max_orphans: 4_096,
            max_frame_size: MAX_MESSAGE_SIZE,
            tick_interval: Duration::from_millis(250),
        }
    }
}
