use std::path::Path;

use braid_core::{BraidError, Timestamp, Value};
use braid_crypto::hash160;
use braid_dag::ValidationRules;
use braid_script::p2pkh;
use serde::{Deserialize, Serialize};

/// Per-network tunables. Every node on a network must use identical values:
/// the genesis ids are derived from them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkParams {
    /// Network name exchanged in HELLO.
    pub network: String,

    /// Timestamp of the genesis block; genesis transactions follow at +1, +2.
    pub genesis_timestamp: Timestamp,

    /// Locking script of the single genesis output (hex in JSON).
    #[serde(with = "hex_bytes")]
    pub genesis_output_script: Vec<u8>,

    /// Entire initial supply, paid to `genesis_output_script`.
    pub genesis_supply: Value,

    pub min_block_weight: f64,
    pub min_tx_weight: f64,

    /// Maximum total output value of a non-genesis block.
    pub block_reward: Value,

    /// Seconds a timestamp may run ahead of the local clock.
    pub max_future_drift: i64,
}

impl NetworkParams {
    /// Built-in public test network.
    pub fn testnet() -> Self {
        Self {
            network: "braid-testnet".into(),
            genesis_timestamp: 1_767_225_600, // 2026-01-01 00:00:00 UTC
            genesis_output_script: p2pkh(&hash160(b"braid-testnet-genesis")),
            genesis_supply: 100_000_000_000,
            min_block_weight: 16.0,
            min_tx_weight: 12.0,
            block_reward: 6_400,
            max_future_drift: 300,
        }
    }

    /// Low-weight parameters for local development and tests.
    pub fn unittests(genesis_output_script: Vec<u8>) -> Self {
        Self {
            network: "braid-unittests".into(),
            genesis_timestamp: 1_700_000_000,
            genesis_output_script,
            genesis_supply: 1_000_000,
            min_block_weight: 2.0,
            min_tx_weight: 1.0,
            block_reward: 6_400,
            max_future_drift: 300,
        }
    }

    /// Load parameters from a JSON file.
    pub fn load(path: &Path) -> Result<Self, BraidError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BraidError::Io(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| BraidError::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, BraidError> {
        serde_json::to_string_pretty(self).map_err(|e| BraidError::Serialization(e.to_string()))
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            min_block_weight: self.min_block_weight,
            min_tx_weight: self.min_tx_weight,
            block_reward: self.block_reward,
            max_future_drift: self.max_future_drift,
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
