use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use braid_consensus::{ConsensusTracker, ConsensusUpdate, WorkVerifier};
use braid_core::{
    BraidError, OutPoint, Timestamp, TxInput, TxOutput, Value, Vertex, VertexId, VertexKind,
};
use braid_dag::{
    validate_parents, validate_structure, AcceptRecord, ParentView, ValidationRules, VertexMeta,
    VertexStore,
};
use braid_genesis::{genesis_id, genesis_vertices, NetworkParams};
use braid_script::{verify_input, ScriptExtras};
use tracing::info;

use crate::pubsub::{Event, PubSub};

/// Result of submitting a vertex that did not fail validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Validated, persisted and announced.
    Accepted,
    /// Already in the store; nothing was re-validated or re-written.
    AlreadyKnown,
}

/// The acceptance path for every vertex, local or peer-relayed.
///
/// Owns the store and the consensus tracker: nothing else mutates them.
/// Callers serialize access (the node wraps the engine in one mutex), so the
/// checks of one acceptance never interleave with another.
pub struct ValidationEngine {
    store: Box<dyn VertexStore>,
    tracker: ConsensusTracker,
    work: Arc<dyn WorkVerifier>,
    params: NetworkParams,
    rules: ValidationRules,
    pubsub: Arc<PubSub>,
    genesis: VertexId,
}

impl ValidationEngine {
    /// Open the engine over `store`. An empty store receives the genesis set;
    /// a non-empty one must already hold this network's genesis block.
    pub fn open(
        mut store: Box<dyn VertexStore>,
        params: NetworkParams,
        work: Arc<dyn WorkVerifier>,
        pubsub: Arc<PubSub>,
    ) -> Result<Self, BraidError> {
        let genesis = genesis_id(&params);
        let tracker = if store.is_empty()? {
            let mut tracker = ConsensusTracker::new();
            for vertex in genesis_vertices(&params) {
                let update = tracker.plan_genesis(&vertex);
                let record = AcceptRecord {
                    meta: VertexMeta::genesis(vertex.weight, params.genesis_timestamp),
                    tips: update.tips.clone(),
                    spends: Vec::new(),
                    vertex,
                };
                store.put(&record)?;
                tracker.apply(&update);
            }
            store.flush()?;
            info!(network = %params.network, genesis = %genesis.short(), "wrote genesis set");
            tracker
        } else {
            if !store.exists(&genesis)? {
                return Err(BraidError::Conflict(format!(
                    "store does not contain genesis {} of network {}",
                    genesis, params.network
                )));
            }
            ConsensusTracker::rebuild(&*store)?
        };

        Ok(Self {
            store,
            tracker,
            work,
            rules: params.validation_rules(),
            params,
            pubsub,
            genesis,
        })
    }

    /// Validate `vertex` and, on success, persist it and announce it.
    ///
    /// Checks run in order and stop at the first failure: structure, parents,
    /// input references, scripts, conservation, double spends, work. Nothing
    /// is written unless every check passes.
    pub fn accept(&mut self, vertex: Vertex, now: Timestamp) -> Result<AcceptOutcome, BraidError> {
        if self.store.exists(&vertex.hash)? {
            return Ok(AcceptOutcome::AlreadyKnown);
        }

        validate_structure(&vertex, &self.rules, now)?;
        let store = &*self.store;
        validate_parents(&vertex, |id| {
            Ok(store.get(id)?.map(|p| ParentView {
                kind: p.kind,
                timestamp: p.timestamp,
            }))
        })?;

        let spent = self.resolve_inputs(&vertex)?;
        self.verify_scripts(&vertex, &spent)?;
        self.check_conservation(&vertex, &spent)?;

        for outpoint in vertex.spent_outpoints() {
            if let Some(spender) = self.store.spender_of(outpoint)? {
                return Err(BraidError::DoubleSpend {
                    outpoint: outpoint.to_string(),
                    spender: spender.to_hex(),
                });
            }
        }

        if !self.work.verify_work(&vertex) {
            return Err(BraidError::InvalidPoW);
        }

        let update = self.tracker.plan(&vertex)?;
        self.commit(vertex, update, now)
    }

    fn commit(
        &mut self,
        vertex: Vertex,
        update: ConsensusUpdate,
        now: Timestamp,
    ) -> Result<AcceptOutcome, BraidError> {
        let record = AcceptRecord {
            meta: update.to_meta(now),
            tips: update.tips.clone(),
            spends: vertex.spent_outpoints().copied().collect(),
            vertex,
        };
        if !self.store.put(&record)? {
            return Ok(AcceptOutcome::AlreadyKnown);
        }
        self.tracker.apply(&update);

        let vertex = Arc::new(record.vertex);
        info!(
            vertex = %vertex.hash.short(),
            kind = %vertex.kind,
            weight = vertex.weight,
            height = update.height,
            "accepted vertex"
        );
        self.pubsub.publish(&Event::VertexAccepted(vertex));
        if update.new_best {
            self.pubsub.publish(&Event::BestBlockChanged {
                block: update.id,
                accumulated_weight: update.accumulated_weight,
            });
        }
        Ok(AcceptOutcome::Accepted)
    }

    /// Fetch each vertex spent by `vertex`'s inputs, keyed by id.
    fn resolve_inputs(&self, vertex: &Vertex) -> Result<HashMap<VertexId, Vertex>, BraidError> {
        let mut spent: HashMap<VertexId, Vertex> = HashMap::new();
        for input in &vertex.inputs {
            let outpoint = &input.spent;
            if !spent.contains_key(&outpoint.vertex) {
                let source = self
                    .store
                    .get(&outpoint.vertex)?
                    .ok_or_else(|| BraidError::UnknownParent(outpoint.vertex.to_hex()))?;
                spent.insert(outpoint.vertex, source);
            }
            let source = &spent[&outpoint.vertex];
            if outpoint.index as usize >= source.outputs.len() {
                return Err(BraidError::InvalidOutputIndex {
                    vertex: outpoint.vertex.to_hex(),
                    index: outpoint.index,
                });
            }
        }
        Ok(spent)
    }

    fn verify_scripts(
        &self,
        vertex: &Vertex,
        spent: &HashMap<VertexId, Vertex>,
    ) -> Result<(), BraidError> {
        for (index, input) in vertex.inputs.iter().enumerate() {
            let source = &spent[&input.spent.vertex];
            let locking = &source.outputs[input.spent.index as usize].script;
            let extras = ScriptExtras {
                tx: vertex,
                input_index: index,
                spent_vertex: source,
            };
            verify_input(&input.data, locking, &extras)
                .map_err(|source| BraidError::Script { input: index, source })?;
        }
        Ok(())
    }

    fn check_conservation(
        &self,
        vertex: &Vertex,
        spent: &HashMap<VertexId, Vertex>,
    ) -> Result<(), BraidError> {
        if vertex.is_block() {
            return Ok(());
        }
        let overflow = || BraidError::Malformed("value overflow".into());
        let mut inputs: Value = 0;
        for input in &vertex.inputs {
            let value = spent[&input.spent.vertex].outputs[input.spent.index as usize].value;
            inputs = inputs.checked_add(value).ok_or_else(overflow)?;
        }
        let outputs = vertex.output_total().ok_or_else(overflow)?;
        if inputs != outputs {
            return Err(BraidError::InputOutputMismatch { inputs, outputs });
        }
        Ok(())
    }

    /// Parents and spent vertices of `vertex` that are not in the store yet.
    pub fn missing_dependencies(&self, vertex: &Vertex) -> Result<Vec<VertexId>, BraidError> {
        let mut missing = Vec::new();
        let referenced = vertex
            .parents
            .iter()
            .chain(vertex.spent_outpoints().map(|o| &o.vertex));
        for id in referenced {
            if !missing.contains(id) && !self.store.exists(id)? {
                missing.push(*id);
            }
        }
        Ok(missing)
    }

    // ── Templates ────────────────────────────────────────────────────────────

    /// Two transaction parents for a new vertex. Uses the two smallest
    /// transaction tips; with a single tip, pairs it with one of its parents.
    pub fn choose_tx_parents(&self) -> Result<[VertexId; 2], BraidError> {
        let tips = self.tracker.tip_hashes(VertexKind::Transaction);
        let mut iter = tips.iter().copied();
        match (iter.next(), iter.next()) {
            (Some(a), Some(b)) => Ok([a, b]),
            (Some(only), None) => {
                let tip = self
                    .store
                    .get(&only)?
                    .ok_or_else(|| BraidError::Storage(format!("missing tip {only}")))?;
                let parent = tip.parents.first().copied().ok_or_else(|| {
                    BraidError::Conflict("single transaction tip has no parent".into())
                })?;
                Ok([only, parent])
            }
            _ => Err(BraidError::Conflict("no transaction tips".into())),
        }
    }

    fn latest_timestamp(&self, parents: &[VertexId], now: Timestamp) -> Result<Timestamp, BraidError> {
        let mut timestamp = now;
        for id in parents {
            let parent = self
                .store
                .get(id)?
                .ok_or_else(|| BraidError::UnknownParent(id.to_hex()))?;
            timestamp = timestamp.max(parent.timestamp);
        }
        Ok(timestamp)
    }

    /// Unsealed block on top of the best block and two transaction parents.
    pub fn block_template(
        &self,
        outputs: Vec<TxOutput>,
        now: Timestamp,
    ) -> Result<Vertex, BraidError> {
        let (best, _) = self
            .tracker
            .best_block()
            .ok_or_else(|| BraidError::Conflict("no best block".into()))?;
        let [tx_a, tx_b] = self.choose_tx_parents()?;
        let parents = vec![best, tx_a, tx_b];
        let timestamp = self.latest_timestamp(&parents, now)?;
        Ok(Vertex::new_block(
            parents,
            self.params.min_block_weight,
            timestamp,
            outputs,
        ))
    }

    /// Unsigned, unsealed transaction over the current transaction tips.
    pub fn transaction_template(
        &self,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        now: Timestamp,
    ) -> Result<Vertex, BraidError> {
        let parents = self.choose_tx_parents()?.to_vec();
        let timestamp = self.latest_timestamp(&parents, now)?;
        Ok(Vertex::new_transaction(
            parents,
            self.params.min_tx_weight,
            timestamp,
            inputs,
            outputs,
        ))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, id: &VertexId) -> Result<Option<Vertex>, BraidError> {
        self.store.get(id)
    }

    pub fn exists(&self, id: &VertexId) -> Result<bool, BraidError> {
        self.store.exists(id)
    }

    pub fn meta(&self, id: &VertexId) -> Result<Option<VertexMeta>, BraidError> {
        self.store.meta(id)
    }

    pub fn tips(&self, kind: VertexKind) -> &BTreeSet<VertexId> {
        self.tracker.tip_hashes(kind)
    }

    /// Best block id and its accumulated weight.
    pub fn best_block(&self) -> Option<(VertexId, f64)> {
        self.tracker.best_block()
    }

    pub fn accumulated_weight(&self, id: &VertexId) -> Option<f64> {
        self.tracker.accumulated_weight(id)
    }

    pub fn get_blocks_before(&self, id: &VertexId, count: usize) -> Vec<VertexId> {
        self.tracker.get_blocks_before(id, count)
    }

    pub fn is_connected_to_genesis(&self, id: &VertexId) -> Result<bool, BraidError> {
        self.store.is_connected_to_genesis(id)
    }

    pub fn count(&self, kind: VertexKind) -> Result<usize, BraidError> {
        self.store.count(kind)
    }

    pub fn spender_of(&self, outpoint: &OutPoint) -> Result<Option<VertexId>, BraidError> {
        self.store.spender_of(outpoint)
    }

    pub fn flush(&self) -> Result<(), BraidError> {
        self.store.flush()
    }

    pub fn genesis(&self) -> VertexId {
        self.genesis
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn pubsub(&self) -> &Arc<PubSub> {
        &self.pubsub
    }
}
