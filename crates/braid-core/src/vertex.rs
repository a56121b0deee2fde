use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::CanonicalWriter;
use crate::types::{OutPoint, Timestamp, Value, VertexId};

// ── VertexKind ────────────────────────────────────────────────────────────────

/// The two sub-DAGs of the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexKind {
    Block,
    Transaction,
}

impl VertexKind {
    fn tag(self) -> u8 {
        match self {
            VertexKind::Block => 0,
            VertexKind::Transaction => 1,
        }
    }
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexKind::Block => write!(f, "block"),
            VertexKind::Transaction => write!(f, "transaction"),
        }
    }
}

// ── Inputs / outputs ──────────────────────────────────────────────────────────

/// Spends one output of an earlier vertex. `data` is the unlocking script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub spent: OutPoint,
    pub data: Vec<u8>,
}

impl TxInput {
    pub fn new(spent: OutPoint, data: Vec<u8>) -> Self {
        Self { spent, data }
    }
}

/// A value guarded by a locking script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Value,
    pub script: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: Value, script: Vec<u8>) -> Self {
        Self { value, script }
    }
}

// ── Vertex ────────────────────────────────────────────────────────────────────

/// A block or transaction of the DAG.
///
/// `hash` is BLAKE3 over `body_bytes()` followed by the little-endian `nonce`;
/// see `braid_crypto::vertex_id`. Genesis vertices are the only ones without
/// parents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub hash: VertexId,
    pub kind: VertexKind,
    pub parents: Vec<VertexId>,
    /// Proof-of-work cost: `ceil(weight)` leading zero bits are required.
    pub weight: f64,
    pub timestamp: Timestamp,
    /// Always empty for blocks.
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub nonce: u64,
    /// Block auxiliary data; always empty for transactions.
    pub data: Vec<u8>,
}

impl Vertex {
    /// A block with no hash and no nonce yet.
    pub fn new_block(
        parents: Vec<VertexId>,
        weight: f64,
        timestamp: Timestamp,
        outputs: Vec<TxOutput>,
    ) -> Self {
        Self {
            hash: VertexId::ZERO,
            kind: VertexKind::Block,
            parents,
            weight,
            timestamp,
            inputs: Vec::new(),
            outputs,
            nonce: 0,
            data: Vec::new(),
        }
    }

    /// A transaction with no hash and no nonce yet.
    pub fn new_transaction(
        parents: Vec<VertexId>,
        weight: f64,
        timestamp: Timestamp,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
    ) -> Self {
        Self {
            hash: VertexId::ZERO,
            kind: VertexKind::Transaction,
            parents,
            weight,
            timestamp,
            inputs,
            outputs,
            nonce: 0,
            data: Vec::new(),
        }
    }

    pub fn is_block(&self) -> bool {
        self.kind == VertexKind::Block
    }

    pub fn is_transaction(&self) -> bool {
        self.kind == VertexKind::Transaction
    }

    pub fn is_genesis(&self) -> bool {
        self.parents.is_empty()
    }

    /// Canonical bytes covering everything except `hash` and `nonce`.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::new();
        w.u8(self.kind.tag());
        w.u32(self.parents.len() as u32);
        for parent in &self.parents {
            w.raw(parent.as_bytes());
        }
        w.f64(self.weight);
        w.i64(self.timestamp);
        w.u32(self.inputs.len() as u32);
        for input in &self.inputs {
            w.raw(input.spent.vertex.as_bytes());
            w.u32(input.spent.index);
            w.bytes(&input.data);
        }
        self.write_outputs(&mut w);
        w.bytes(&self.data);
        w.finish()
    }

    /// Signature-hash preimage ("sighash-all"): kind, every spent outpoint
    /// and every output. Unlocking scripts, parents, weight, timestamp and
    /// nonce are excluded so a signer can commit before the vertex is sealed.
    pub fn sighash_all(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::new();
        w.u8(self.kind.tag());
        w.u32(self.inputs.len() as u32);
        for input in &self.inputs {
            w.raw(input.spent.vertex.as_bytes());
            w.u32(input.spent.index);
        }
        self.write_outputs(&mut w);
        w.finish()
    }

    fn write_outputs(&self, w: &mut CanonicalWriter) {
        w.u32(self.outputs.len() as u32);
        for output in &self.outputs {
            w.u64(output.value);
            w.bytes(&output.script);
        }
    }

    /// Sum of output values, `None` on overflow.
    pub fn output_total(&self) -> Option<Value> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    pub fn outpoint(&self, index: u32) -> OutPoint {
        OutPoint::new(self.hash, index)
    }

    /// Outpoints this vertex spends, in input order.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.inputs.iter().map(|i| &i.spent)
    }
}
