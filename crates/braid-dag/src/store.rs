use std::collections::{BTreeSet, HashMap};

use braid_core::{BraidError, OutPoint, Vertex, VertexId, VertexKind};

use crate::meta::VertexMeta;

/// Tip-set edit produced by accepting one vertex.
///
/// `added` joins the tip set of `kind`; every id in `removed` leaves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipChanges {
    pub kind: VertexKind,
    pub added: VertexId,
    pub removed: Vec<VertexId>,
}

/// Everything written when one vertex is accepted. Stores apply it
/// atomically: either all of it is visible or none of it.
#[derive(Clone, Debug)]
pub struct AcceptRecord {
    pub vertex: Vertex,
    pub meta: VertexMeta,
    pub tips: TipChanges,
    /// Outpoints newly spent by `vertex`.
    pub spends: Vec<OutPoint>,
}

/// Persistence contract for accepted vertices and their indexes.
pub trait VertexStore: Send {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, BraidError>;

    fn exists(&self, id: &VertexId) -> Result<bool, BraidError>;

    fn meta(&self, id: &VertexId) -> Result<Option<VertexMeta>, BraidError>;

    /// Current tips of one sub-DAG.
    fn tips(&self, kind: VertexKind) -> Result<BTreeSet<VertexId>, BraidError>;

    /// Accepted vertex that spent `outpoint`, if any.
    fn spender_of(&self, outpoint: &OutPoint) -> Result<Option<VertexId>, BraidError>;

    /// All accepted ids of one kind, in no particular order.
    fn ids(&self, kind: VertexKind) -> Result<Vec<VertexId>, BraidError>;

    fn count(&self, kind: VertexKind) -> Result<usize, BraidError> {
        Ok(self.ids(kind)?.len())
    }

    /// True until the first `put`.
    fn is_empty(&self) -> Result<bool, BraidError> {
        Ok(self.count(VertexKind::Block)? == 0 && self.count(VertexKind::Transaction)? == 0)
    }

    /// Write an accepted vertex with its bookkeeping. Idempotent: returns
    /// `false` and writes nothing if the id is already stored.
    fn put(&mut self, record: &AcceptRecord) -> Result<bool, BraidError>;

    /// Make every completed `put` durable.
    fn flush(&self) -> Result<(), BraidError> {
        Ok(())
    }

    /// Holds by induction for stored vertices: a vertex is written only after
    /// all its parents, and genesis vertices have none.
    fn is_connected_to_genesis(&self, id: &VertexId) -> Result<bool, BraidError> {
        let Some(vertex) = self.get(id)? else {
            return Ok(false);
        };
        for parent in &vertex.parents {
            if !self.meta(parent)?.is_some_and(|m| m.is_valid()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Walk best-parent edges backwards from `id`, nearest first, returning
    /// at most `count` block ids. Empty for unknown ids and for genesis.
    fn get_blocks_before(&self, id: &VertexId, count: usize) -> Result<Vec<VertexId>, BraidError> {
        let mut out = Vec::new();
        let mut cursor = match self.meta(id)? {
            Some(meta) => meta.best_parent,
            None => return Ok(out),
        };
        while let Some(current) = cursor {
            if out.len() >= count {
                break;
            }
            out.push(current);
            cursor = self.meta(&current)?.and_then(|m| m.best_parent);
        }
        Ok(out)
    }
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// HashMap-backed store for tests and ephemeral nodes.
#[derive(Default)]
pub struct MemoryStore {
    vertices: HashMap<VertexId, Vertex>,
    metas: HashMap<VertexId, VertexMeta>,
    block_tips: BTreeSet<VertexId>,
    tx_tips: BTreeSet<VertexId>,
    spent: HashMap<OutPoint, VertexId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tip_set_mut(&mut self, kind: VertexKind) -> &mut BTreeSet<VertexId> {
        match kind {
            VertexKind::Block => &mut self.block_tips,
            VertexKind::Transaction => &mut self.tx_tips,
        }
    }
}

impl VertexStore for MemoryStore {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, BraidError> {
        Ok(self.vertices.get(id).cloned())
    }

    fn exists(&self, id: &VertexId) -> Result<bool, BraidError> {
        Ok(self.vertices.contains_key(id))
    }

    fn meta(&self, id: &VertexId) -> Result<Option<VertexMeta>, BraidError> {
        Ok(self.metas.get(id).cloned())
    }

    fn tips(&self, kind: VertexKind) -> Result<BTreeSet<VertexId>, BraidError> {
        Ok(match kind {
            VertexKind::Block => self.block_tips.clone(),
            VertexKind::Transaction => self.tx_tips.clone(),
        })
    }

    fn spender_of(&self, outpoint: &OutPoint) -> Result<Option<VertexId>, BraidError> {
        Ok(self.spent.get(outpoint).copied())
    }

    fn ids(&self, kind: VertexKind) -> Result<Vec<VertexId>, BraidError> {
        Ok(self
            .vertices
            .values()
            .filter(|v| v.kind == kind)
            .map(|v| v.hash)
            .collect())
    }

    fn is_empty(&self) -> Result<bool, BraidError> {
        Ok(self.vertices.is_empty())
    }

    fn put(&mut self, record: &AcceptRecord) -> Result<bool, BraidError> {
        let id = record.vertex.hash;
        if self.vertices.contains_key(&id) {
            return Ok(false);
        }
        for outpoint in &record.spends {
            if let Some(spender) = self.spent.get(outpoint) {
                return Err(BraidError::DoubleSpend {
                    outpoint: outpoint.to_string(),
                    spender: spender.to_hex(),
                });
            }
        }
        for outpoint in &record.spends {
            self.spent.insert(*outpoint, id);
        }
        let tips = self.tip_set_mut(record.tips.kind);
        for removed in &record.tips.removed {
            tips.remove(removed);
        }
        tips.insert(record.tips.added);
        self.metas.insert(id, record.meta.clone());
        self.vertices.insert(id, record.vertex.clone());
        Ok(true)
    }
}
