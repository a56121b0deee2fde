use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use braid_core::{BraidError, Timestamp, Vertex, VertexId, VertexKind};
use braid_dag::{TipChanges, ValidationStatus, VertexMeta, VertexStore};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq)]
struct BlockEntry {
    accumulated_weight: f64,
    best_parent: Option<VertexId>,
    height: u64,
}

/// Bookkeeping a vertex acceptance will apply, computed before anything is
/// written so the store write and the tracker update stay in step.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusUpdate {
    pub id: VertexId,
    pub kind: VertexKind,
    pub accumulated_weight: f64,
    pub best_parent: Option<VertexId>,
    pub height: u64,
    pub tips: TipChanges,
    /// Whether this block becomes the new best tip.
    pub new_best: bool,
}

impl ConsensusUpdate {
    pub fn to_meta(&self, received_at: Timestamp) -> VertexMeta {
        VertexMeta {
            status: ValidationStatus::Valid,
            accumulated_weight: self.accumulated_weight,
            best_parent: self.best_parent,
            height: self.height,
            received_at,
        }
    }
}

/// Incremental accumulated-weight and tip-set tracker.
///
/// Blocks: accumulated weight = own weight + best parent's accumulated
/// weight, where the best parent is the block parent with the greatest
/// accumulated weight (ties: smallest id). The best tip moves only to a block
/// with strictly greater accumulated weight.
///
/// Tips: a block is a tip until another block names it as parent; a
/// transaction is a tip until another transaction names it as parent.
#[derive(Default)]
pub struct ConsensusTracker {
    blocks: HashMap<VertexId, BlockEntry>,
    tx_heights: HashMap<VertexId, u64>,
    block_tips: BTreeSet<VertexId>,
    tx_tips: BTreeSet<VertexId>,
    best: Option<(VertexId, f64)>,
}

impl ConsensusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted metadata and tip indexes.
    pub fn rebuild(store: &dyn VertexStore) -> Result<Self, BraidError> {
        let mut tracker = Self::new();
        for id in store.ids(VertexKind::Block)? {
            let meta = store
                .meta(&id)?
                .ok_or_else(|| BraidError::Storage(format!("missing metadata for {id}")))?;
            tracker.blocks.insert(
                id,
                BlockEntry {
                    accumulated_weight: meta.accumulated_weight,
                    best_parent: meta.best_parent,
                    height: meta.height,
                },
            );
            tracker.consider_best(id, meta.accumulated_weight);
        }
        for id in store.ids(VertexKind::Transaction)? {
            let meta = store
                .meta(&id)?
                .ok_or_else(|| BraidError::Storage(format!("missing metadata for {id}")))?;
            tracker.tx_heights.insert(id, meta.height);
        }
        tracker.block_tips = store.tips(VertexKind::Block)?;
        tracker.tx_tips = store.tips(VertexKind::Transaction)?;
        debug!(
            blocks = tracker.blocks.len(),
            transactions = tracker.tx_heights.len(),
            "consensus tracker rebuilt"
        );
        Ok(tracker)
    }

    /// Bookkeeping for a genesis vertex (no parents).
    pub fn plan_genesis(&self, vertex: &Vertex) -> ConsensusUpdate {
        ConsensusUpdate {
            id: vertex.hash,
            kind: vertex.kind,
            accumulated_weight: vertex.weight,
            best_parent: None,
            height: 0,
            tips: TipChanges {
                kind: vertex.kind,
                added: vertex.hash,
                removed: Vec::new(),
            },
            new_best: vertex.is_block() && self.beats_best(vertex.weight),
        }
    }

    /// Compute the update accepting `vertex` would cause. Every parent must
    /// already be known to the tracker.
    pub fn plan(&self, vertex: &Vertex) -> Result<ConsensusUpdate, BraidError> {
        if vertex.is_genesis() {
            return Ok(self.plan_genesis(vertex));
        }
        match vertex.kind {
            VertexKind::Block => self.plan_block(vertex),
            VertexKind::Transaction => self.plan_transaction(vertex),
        }
    }

    fn plan_block(&self, vertex: &Vertex) -> Result<ConsensusUpdate, BraidError> {
        let mut best: Option<(VertexId, BlockEntry)> = None;
        let mut removed = Vec::new();
        for parent in &vertex.parents {
            let Some(entry) = self.blocks.get(parent) else {
                if self.tx_heights.contains_key(parent) {
                    continue;
                }
                return Err(BraidError::UnknownParent(parent.to_hex()));
            };
            if self.block_tips.contains(parent) {
                removed.push(*parent);
            }
            let better = match &best {
                None => true,
                Some((best_id, best_entry)) => {
                    match entry.accumulated_weight.total_cmp(&best_entry.accumulated_weight) {
                        Ordering::Greater => true,
                        Ordering::Equal => parent < best_id,
                        Ordering::Less => false,
                    }
                }
            };
            if better {
                best = Some((*parent, *entry));
            }
        }
        let (best_parent, parent_entry) = best.ok_or_else(|| {
            BraidError::InvalidParents(format!("block {} has no block parent", vertex.hash))
        })?;
        let accumulated_weight = vertex.weight + parent_entry.accumulated_weight;
        Ok(ConsensusUpdate {
            id: vertex.hash,
            kind: VertexKind::Block,
            accumulated_weight,
            best_parent: Some(best_parent),
            height: parent_entry.height + 1,
            tips: TipChanges {
                kind: VertexKind::Block,
                added: vertex.hash,
                removed,
            },
            new_best: self.beats_best(accumulated_weight),
        })
    }

    fn plan_transaction(&self, vertex: &Vertex) -> Result<ConsensusUpdate, BraidError> {
        let mut height = 0u64;
        let mut removed = Vec::new();
        for parent in &vertex.parents {
            let parent_height = self
                .tx_heights
                .get(parent)
                .ok_or_else(|| BraidError::UnknownParent(parent.to_hex()))?;
            height = height.max(parent_height + 1);
            if self.tx_tips.contains(parent) {
                removed.push(*parent);
            }
        }
        Ok(ConsensusUpdate {
            id: vertex.hash,
            kind: VertexKind::Transaction,
            accumulated_weight: vertex.weight,
            best_parent: None,
            height,
            tips: TipChanges {
                kind: VertexKind::Transaction,
                added: vertex.hash,
                removed,
            },
            new_best: false,
        })
    }

    /// Apply a planned update. Called once the store write has succeeded.
    pub fn apply(&mut self, update: &ConsensusUpdate) {
        let tips = match update.kind {
            VertexKind::Block => {
                self.blocks.insert(
                    update.id,
                    BlockEntry {
                        accumulated_weight: update.accumulated_weight,
                        best_parent: update.best_parent,
                        height: update.height,
                    },
                );
                &mut self.block_tips
            }
            VertexKind::Transaction => {
                self.tx_heights.insert(update.id, update.height);
                &mut self.tx_tips
            }
        };
        for removed in &update.tips.removed {
            tips.remove(removed);
        }
        tips.insert(update.tips.added);

        if update.kind == VertexKind::Block && self.consider_best(update.id, update.accumulated_weight)
        {
            info!(
                block = %update.id.short(),
                accumulated_weight = update.accumulated_weight,
                height = update.height,
                "new best block"
            );
        }
    }

    fn beats_best(&self, accumulated_weight: f64) -> bool {
        match self.best {
            None => true,
            Some((_, best)) => accumulated_weight > best,
        }
    }

    fn consider_best(&mut self, id: VertexId, accumulated_weight: f64) -> bool {
        if self.beats_best(accumulated_weight) {
            self.best = Some((id, accumulated_weight));
            true
        } else {
            false
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn best_block(&self) -> Option<(VertexId, f64)> {
        self.best
    }

    pub fn accumulated_weight(&self, id: &VertexId) -> Option<f64> {
        self.blocks.get(id).map(|e| e.accumulated_weight)
    }

    pub fn height(&self, id: &VertexId) -> Option<u64> {
        self.blocks
            .get(id)
            .map(|e| e.height)
            .or_else(|| self.tx_heights.get(id).copied())
    }

    pub fn contains(&self, id: &VertexId) -> bool {
        self.blocks.contains_key(id) || self.tx_heights.contains_key(id)
    }

    pub fn tip_hashes(&self, kind: VertexKind) -> &BTreeSet<VertexId> {
        match kind {
            VertexKind::Block => &self.block_tips,
            VertexKind::Transaction => &self.tx_tips,
        }
    }

    /// Up to `count` blocks strictly before `id` along best-parent edges,
    /// nearest first. Empty for genesis and for unknown ids.
    pub fn get_blocks_before(&self, id: &VertexId, count: usize) -> Vec<VertexId> {
        let mut out = Vec::new();
        let mut cursor = self.blocks.get(id).and_then(|e| e.best_parent);
        while let Some(current) = cursor {
            if out.len() >= count {
                break;
            }
            out.push(current);
            cursor = self.blocks.get(&current).and_then(|e| e.best_parent);
        }
        out
    }
}
