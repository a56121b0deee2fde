//! braid-p2p
//!
//! Peer synchronization for braid nodes.
//!
//! Each TCP connection runs one `SyncManager`: HELLO and PEER-ID prove both
//! sides' identities, TIPS exchanges expose divergence, and GET-BLOCKS-BEFORE
//! walks find the common ancestor before missing vertices are fetched with
//! GET-DATA. Once tip sets match, accepted vertices are relayed as they
//! arrive.

pub mod config;
pub mod context;
pub mod message;
pub mod network;
pub mod status;
pub mod sync;

pub use config::SyncConfig;
pub use context::{unix_now, NodeContext};
pub use message::Message;
pub use network::ConnectionManager;
pub use status::SyncStatus;
pub use sync::{RelayReceiver, SyncManager, SyncState};
