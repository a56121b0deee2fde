use braid_core::{Timestamp, VertexId};
use serde::{Deserialize, Serialize};

/// Validation status of a vertex.
///
/// Only `Valid` is ever persisted; `Pending` describes a candidate in flight
/// and `Invalid` is returned to the submitter, never stored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationStatus {
    Pending,
    Valid,
    Invalid { reason: String },
}

/// Bookkeeping kept beside every accepted vertex.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VertexMeta {
    pub status: ValidationStatus,

    /// Own weight plus the best parent's accumulated weight. Blocks only;
    /// transactions carry their own weight here.
    pub accumulated_weight: f64,

    /// Block parent with the greatest accumulated weight (ties: smallest id).
    /// `None` for genesis and for transactions.
    pub best_parent: Option<VertexId>,

    /// Distance from genesis along best-parent edges (blocks) or the longest
    /// parent path (transactions).
    pub height: u64,

    /// When this vertex was first accepted locally (UTC Unix seconds).
    pub received_at: Timestamp,
}

impl VertexMeta {
    pub fn genesis(weight: f64, received_at: Timestamp) -> Self {
        Self {
            status: ValidationStatus::Valid,
            accumulated_weight: weight,
            best_parent: None,
            height: 0,
            received_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.status, ValidationStatus::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_survives_bincode() {
        let meta = VertexMeta {
            status: ValidationStatus::Valid,
            accumulated_weight: 12.5,
            best_parent: Some(VertexId::from_bytes([3u8; 32])),
            height: 4,
            received_at: 1_700_000_000,
        };
        let bytes = bincode::serialize(&meta).unwrap();
        let back: VertexMeta = bincode::deserialize(&bytes).unwrap();
        assert_eq!(meta, back);
        assert!(back.is_valid());
    }
}
