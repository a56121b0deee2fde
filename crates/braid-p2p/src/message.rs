use braid_core::constants::MAX_MESSAGE_SIZE;
use braid_core::{BraidError, PeerId, Vertex, VertexId};
use serde::{Deserialize, Serialize};

/// Messages of the per-connection sync protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// First message on a connection, sent by both sides.
    Hello {
        protocol_version: u32,
        network: String,
        /// Genesis block id; peers on different genesis sets never sync.
        genesis: VertexId,
        /// Random bytes the remote must sign in its `PeerIdentity`.
        challenge: [u8; 32],
    },

    /// Identity proof: Dilithium2 signature over the remote challenge
    /// followed by `peer_id`.
    PeerIdentity {
        peer_id: PeerId,
        public_key: Vec<u8>,
        signature: Vec<u8>,
    },

    GetTips,

    /// Current best block and both tip sets.
    Tips {
        best_block: VertexId,
        accumulated_weight: f64,
        block_tips: Vec<VertexId>,
        tx_tips: Vec<VertexId>,
    },

    /// Ask for up to `count` best-parent ancestors of `hash`.
    GetBlocksBefore { hash: VertexId, count: u32 },

    /// Reply to `GetBlocksBefore`, nearest ancestor first.
    Blocks { hash: VertexId, blocks: Vec<VertexId> },

    GetData { hash: VertexId },

    /// A full vertex, either requested or relayed.
    Data { vertex: Vertex },

    /// The sender does not have `hash`.
    NotFound { hash: VertexId },
}

impl Message {
    /// Serialize to bytes for one wire frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BraidError> {
        bincode::serialize(self).map_err(|e| BraidError::Serialization(e.to_string()))
    }

    /// Deserialize one wire frame. Oversized or undecodable frames are
    /// protocol violations.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BraidError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(BraidError::ProtocolViolation(format!(
                "message of {} bytes exceeds {}",
                bytes.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        bincode::deserialize(bytes)
            .map_err(|e| BraidError::ProtocolViolation(format!("undecodable message: {e}")))
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "HELLO",
            Message::PeerIdentity { .. } => "PEER-ID",
            Message::GetTips => "GET-TIPS",
            Message::Tips { .. } => "TIPS",
            Message::GetBlocksBefore { .. } => "GET-BLOCKS-BEFORE",
            Message::Blocks { .. } => "BLOCKS",
            Message::GetData { .. } => "GET-DATA",
            Message::Data { .. } => "DATA",
            Message::NotFound { .. } => "NOT-FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_protocol_violation() {
        let err = Message::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).unwrap_err();
        assert!(err.is_fatal_to_connection());
    }

    #[test]
    fn get_blocks_before_survives_the_wire() {
        let msg = Message::GetBlocksBefore {
            hash: VertexId::from_bytes([3; 32]),
            count: 17,
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
        assert_eq!(msg.name(), "GET-BLOCKS-BEFORE");
    }
}
