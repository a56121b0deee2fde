//! Per-connection sync protocol.
//!
//! A [`SyncManager`] owns no socket. It consumes decoded messages, relay
//! events and clock ticks, and returns the messages to send back, so the TCP
//! task and in-process tests drive it the same way.
//!
//! ```text
//! WaitingForPeers ─start─▶ Handshaking ─PEER-ID ok─▶ Syncing ◀──▶ Synced
//!                                  └────── any fatal error ──────▶ Closed
//! ```
//!
//! Reconciliation: unknown remote block tips are walked backwards with
//! GET-BLOCKS-BEFORE until a locally known ancestor appears, then the missing
//! blocks are fetched ancestor first. Unknown transaction tips are fetched
//! directly. A vertex whose dependencies are missing is buffered under each
//! missing id and retried when that id is accepted.
//!
//! The orphan buffer is bounded. Fetching a deep transaction history from
//! its tip fills it with descendants first, so when it is full the oldest
//! entry (the one furthest from the local DAG) is evicted and its id kept.
//! Once every buffered orphan has been accepted, the evicted ids are fetched
//! again nearest first; each then finds its parents already present.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use braid_core::constants::{MAX_BLOCKS_PER_BATCH, MAX_TIPS_ADVERTISED};
use braid_core::{BraidError, PeerId, Vertex, VertexId, VertexKind};
use braid_crypto::{random_challenge, verify_peer_proof};
use braid_state::{AcceptOutcome, Event, EventHandler, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::context::{unix_now, NodeContext};
use crate::message::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    WaitingForPeers,
    Handshaking,
    Syncing,
    Synced,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Request {
    Tips,
    BlocksBefore(VertexId),
    Data(VertexId),
}

struct Pending {
    message: Message,
    sent_at: Instant,
    retries: u32,
}

struct Orphan {
    vertex: Vertex,
    /// Ids this vertex is listed under in `waiting_on`.
    missing: Vec<VertexId>,
}

/// Vertices accepted locally, to be relayed to this connection's peer.
pub type RelayReceiver = mpsc::UnboundedReceiver<Arc<Vertex>>;

pub struct SyncManager {
    ctx: NodeContext,
    state: SyncState,
    challenge: [u8; 32],
    hello_received: bool,
    peer: Option<PeerId>,
    started_at: Option<Instant>,
    outbox: Vec<Message>,
    pending: HashMap<Request, Pending>,
    /// Backward walks keyed by the block last asked about; the value holds
    /// the unknown blocks found so far, nearest the remote tip first.
    walks: HashMap<VertexId, Vec<VertexId>>,
    wanted: VecDeque<VertexId>,
    orphans: HashMap<VertexId, Orphan>,
    /// Orphan ids in buffering order; may hold ids already released.
    orphan_order: VecDeque<VertexId>,
    waiting_on: HashMap<VertexId, Vec<VertexId>>,
    /// Orphans pushed out of a full buffer, oldest first.
    evicted: Vec<VertexId>,
    known_by_peer: HashSet<VertexId>,
    known_order: VecDeque<VertexId>,
    last_tips_request: Option<Instant>,
    relay_handler: EventHandler,
}

impl SyncManager {
    /// Create a manager for one connection. Every vertex the node accepts
    /// from now on is delivered on the returned receiver; feed it back
    /// through [`SyncManager::on_relay`].
    pub fn new(ctx: NodeContext) -> (Self, RelayReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay_handler: EventHandler = Arc::new(move |event: &Event| {
            if let Event::VertexAccepted(vertex) = event {
                let _ = tx.send(vertex.clone());
            }
        });
        ctx.pubsub
            .subscribe(EventKind::VertexAccepted, relay_handler.clone());

        let manager = Self {
            ctx,
            state: SyncState::WaitingForPeers,
            challenge: random_challenge(),
            hello_received: false,
            peer: None,
            started_at: None,
            outbox: Vec::new(),
            pending: HashMap::new(),
            walks: HashMap::new(),
            wanted: VecDeque::new(),
            orphans: HashMap::new(),
            orphan_order: VecDeque::new(),
            waiting_on: HashMap::new(),
            evicted: Vec::new(),
            known_by_peer: HashSet::new(),
            known_order: VecDeque::new(),
            last_tips_request: None,
            relay_handler,
        };
        (manager, rx)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Remote peer id, once the handshake has verified it.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer
    }

    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    fn peer_label(&self) -> String {
        self.peer
            .map(|p| p.to_b58())
            .unwrap_or_else(|| "unidentified".into())
    }

    fn is_handshaken(&self) -> bool {
        matches!(self.state, SyncState::Syncing | SyncState::Synced)
    }

    /// No request outstanding and nothing left to fetch or retry.
    fn is_quiescent(&self) -> bool {
        self.pending.is_empty()
            && self.wanted.is_empty()
            && self.walks.is_empty()
            && self.orphans.is_empty()
            && self.evicted.is_empty()
    }

    // ── Driving ──────────────────────────────────────────────────────────────

    /// Open the handshake. Call once the transport is connected.
    pub fn start(&mut self, now: Instant) -> Vec<Message> {
        if self.state == SyncState::WaitingForPeers {
            self.send_hello(now);
        }
        std::mem::take(&mut self.outbox)
    }

    fn send_hello(&mut self, now: Instant) {
        let genesis = self.ctx.engine.lock().genesis();
        self.outbox.push(Message::Hello {
            protocol_version: self.ctx.config.protocol_version,
            network: self.ctx.params.network.clone(),
            genesis,
            challenge: self.challenge,
        });
        self.started_at = Some(now);
        self.state = SyncState::Handshaking;
    }

    /// Decode and handle one wire frame.
    pub fn handle_bytes(&mut self, bytes: &[u8], now: Instant) -> Result<Vec<Message>, BraidError> {
        match Message::from_bytes(bytes) {
            Ok(msg) => self.handle(msg, now),
            Err(e) => {
                warn!(peer = %self.peer_label(), error = %e, "closing connection");
                self.close();
                Err(e)
            }
        }
    }

    /// Handle one message. An error closes the connection.
    pub fn handle(&mut self, msg: Message, now: Instant) -> Result<Vec<Message>, BraidError> {
        if self.state == SyncState::Closed {
            return Ok(Vec::new());
        }
        trace!(peer = %self.peer_label(), msg = msg.name(), "received");
        if let Err(e) = self.dispatch(msg, now).and_then(|()| self.refetch_evicted()) {
            warn!(peer = %self.peer_label(), error = %e, "closing connection");
            self.close();
            return Err(e);
        }
        self.flush_requests(now);
        Ok(std::mem::take(&mut self.outbox))
    }

    /// Forward a locally accepted vertex unless the peer already has it.
    pub fn on_relay(&mut self, vertex: Arc<Vertex>) -> Vec<Message> {
        if !self.is_handshaken() || self.known_by_peer.contains(&vertex.hash) {
            return Vec::new();
        }
        self.remember(vertex.hash);
        trace!(peer = %self.peer_label(), vertex = %vertex.hash.short(), "relaying");
        vec![Message::Data {
            vertex: (*vertex).clone(),
        }]
    }

    /// Retry expired requests and poll tips when idle.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Message>, BraidError> {
        match self.state {
            SyncState::Closed | SyncState::WaitingForPeers => return Ok(Vec::new()),
            SyncState::Handshaking => {
                let config = &self.ctx.config;
                let limit = config.request_timeout * (config.max_retries + 1);
                if self.started_at.is_some_and(|t| now.duration_since(t) >= limit) {
                    self.close();
                    return Err(BraidError::PeerTimeout("handshake not completed".into()));
                }
                return Ok(Vec::new());
            }
            SyncState::Syncing | SyncState::Synced => {}
        }

        if let Err(e) = self.retry_expired(now) {
            warn!(peer = %self.peer_label(), error = %e, "closing connection");
            self.close();
            return Err(e);
        }

        if self.pending.is_empty() {
            let interval = if self.is_synced() {
                self.ctx.config.synced_poll_interval
            } else {
                self.ctx.config.tips_poll_interval
            };
            let due = self
                .last_tips_request
                .map_or(true, |t| now.duration_since(t) >= interval);
            if due {
                self.poll_tips(now);
            }
        }
        self.flush_requests(now);
        Ok(std::mem::take(&mut self.outbox))
    }

    fn retry_expired(&mut self, now: Instant) -> Result<(), BraidError> {
        let timeout = self.ctx.config.request_timeout;
        let max_retries = self.ctx.config.max_retries;
        for (key, pending) in self.pending.iter_mut() {
            if now.duration_since(pending.sent_at) < timeout {
                continue;
            }
            if pending.retries >= max_retries {
                return Err(BraidError::PeerTimeout(format!(
                    "{} unanswered after {} retries",
                    pending.message.name(),
                    pending.retries
                )));
            }
            pending.retries += 1;
            pending.sent_at = now;
            debug!(request = ?key, attempt = pending.retries, "re-sending request");
            self.outbox.push(pending.message.clone());
        }
        Ok(())
    }

    /// Cancel everything in flight and stop relaying. Idempotent.
    pub fn close(&mut self) {
        if self.state == SyncState::Closed {
            return;
        }
        self.ctx
            .pubsub
            .unsubscribe(EventKind::VertexAccepted, &self.relay_handler);
        self.state = SyncState::Closed;
        self.pending.clear();
        self.walks.clear();
        self.wanted.clear();
        self.orphans.clear();
        self.orphan_order.clear();
        self.waiting_on.clear();
        self.evicted.clear();
        self.outbox.clear();
        debug!(peer = %self.peer_label(), "sync manager closed");
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    fn dispatch(&mut self, msg: Message, now: Instant) -> Result<(), BraidError> {
        match msg {
            Message::Hello {
                protocol_version,
                network,
                genesis,
                challenge,
            } => self.on_hello(protocol_version, &network, genesis, challenge, now),
            Message::PeerIdentity {
                peer_id,
                public_key,
                signature,
            } => self.on_peer_identity(peer_id, &public_key, &signature, now),
            other if !self.is_handshaken() => Err(BraidError::ProtocolViolation(format!(
                "{} before handshake",
                other.name()
            ))),
            Message::GetTips => {
                let tips = self.tips_message();
                self.outbox.push(tips);
                Ok(())
            }
            Message::Tips {
                best_block,
                accumulated_weight,
                block_tips,
                tx_tips,
            } => self.on_tips(best_block, accumulated_weight, block_tips, tx_tips, now),
            Message::GetBlocksBefore { hash, count } => self.on_get_blocks_before(hash, count),
            Message::Blocks { hash, blocks } => self.on_blocks(hash, blocks, now),
            Message::GetData { hash } => self.on_get_data(hash),
            Message::Data { vertex } => self.on_data(vertex, now),
            Message::NotFound { hash } => {
                self.on_not_found(hash);
                Ok(())
            }
        }
    }

    fn on_hello(
        &mut self,
        protocol_version: u32,
        network: &str,
        genesis: VertexId,
        challenge: [u8; 32],
        now: Instant,
    ) -> Result<(), BraidError> {
        if self.hello_received || self.is_handshaken() {
            return Err(BraidError::ProtocolViolation("duplicate HELLO".into()));
        }
        if self.state == SyncState::WaitingForPeers {
            self.send_hello(now);
        }
        if protocol_version != self.ctx.config.protocol_version {
            return Err(BraidError::ProtocolViolation(format!(
                "protocol version {} (expected {})",
                protocol_version, self.ctx.config.protocol_version
            )));
        }
        if network != self.ctx.params.network {
            return Err(BraidError::ProtocolViolation(format!(
                "network {network} (expected {})",
                self.ctx.params.network
            )));
        }
        let local_genesis = self.ctx.engine.lock().genesis();
        if genesis != local_genesis {
            return Err(BraidError::ProtocolViolation(format!(
                "genesis {} (expected {})",
                genesis.short(),
                local_genesis.short()
            )));
        }
        self.hello_received = true;

        let identity = &self.ctx.identity;
        let signature = identity
            .sign_challenge(&challenge)
            .map_err(|e| BraidError::Other(format!("signing challenge: {e}")))?;
        self.outbox.push(Message::PeerIdentity {
            peer_id: identity.peer_id,
            public_key: identity.public_key.clone(),
            signature,
        });
        Ok(())
    }

    fn on_peer_identity(
        &mut self,
        peer_id: PeerId,
        public_key: &[u8],
        signature: &[u8],
        now: Instant,
    ) -> Result<(), BraidError> {
        if !self.hello_received || self.peer.is_some() {
            return Err(BraidError::ProtocolViolation("unexpected PEER-ID".into()));
        }
        verify_peer_proof(&peer_id, public_key, &self.challenge, signature)
            .map_err(|e| BraidError::ProtocolViolation(format!("identity proof: {e}")))?;
        if peer_id == self.ctx.identity.peer_id {
            return Err(BraidError::ProtocolViolation("connected to self".into()));
        }
        self.peer = Some(peer_id);
        self.state = SyncState::Syncing;
        info!(peer = %peer_id, "peer handshake complete");
        self.poll_tips(now);
        Ok(())
    }

    fn tips_message(&self) -> Message {
        let engine = self.ctx.engine.lock();
        let (best_block, accumulated_weight) =
            engine.best_block().unwrap_or((engine.genesis(), 0.0));
        Message::Tips {
            best_block,
            accumulated_weight,
            block_tips: advertised(engine.tips(VertexKind::Block)).collect(),
            tx_tips: advertised(engine.tips(VertexKind::Transaction)).collect(),
        }
    }

    fn on_tips(
        &mut self,
        best_block: VertexId,
        accumulated_weight: f64,
        block_tips: Vec<VertexId>,
        tx_tips: Vec<VertexId>,
        now: Instant,
    ) -> Result<(), BraidError> {
        if block_tips.len() > MAX_TIPS_ADVERTISED || tx_tips.len() > MAX_TIPS_ADVERTISED {
            return Err(BraidError::ProtocolViolation("too many tips advertised".into()));
        }
        if self.pending.remove(&Request::Tips).is_none() {
            debug!(peer = %self.peer_label(), "unsolicited TIPS");
        }
        for id in block_tips.iter().chain(&tx_tips) {
            self.remember(*id);
        }

        let (unknown_blocks, unknown_txs, in_step, local_weight) = {
            let engine = self.ctx.engine.lock();
            let mut unknown_blocks = Vec::new();
            for id in &block_tips {
                if !engine.exists(id)? {
                    unknown_blocks.push(*id);
                }
            }
            let mut unknown_txs = Vec::new();
            for id in &tx_tips {
                if !engine.exists(id)? {
                    unknown_txs.push(*id);
                }
            }
            // Both sides advertise the same truncated view, so compare that.
            let same = |local: &BTreeSet<VertexId>, remote: &[VertexId]| {
                let remote: BTreeSet<VertexId> = remote.iter().copied().collect();
                advertised(local).eq(remote.iter().copied())
            };
            let in_step = same(engine.tips(VertexKind::Block), &block_tips)
                && same(engine.tips(VertexKind::Transaction), &tx_tips);
            let local_weight = engine.best_block().map_or(0.0, |b| b.1);
            (unknown_blocks, unknown_txs, in_step, local_weight)
        };

        debug!(
            peer = %self.peer_label(),
            remote_best = %best_block.short(),
            remote_weight = accumulated_weight,
            local_weight,
            unknown_blocks = unknown_blocks.len(),
            unknown_txs = unknown_txs.len(),
            "peer tips"
        );

        let batch = self.ctx.config.blocks_per_batch.min(MAX_BLOCKS_PER_BATCH);
        for id in unknown_blocks {
            if self.walks.contains_key(&id) || self.is_requested(&id) {
                continue;
            }
            self.walks.insert(id, vec![id]);
            self.request(
                Request::BlocksBefore(id),
                Message::GetBlocksBefore { hash: id, count: batch },
                now,
            );
        }
        for id in unknown_txs {
            self.want(id, false)?;
        }

        let next = if in_step && self.is_quiescent() {
            SyncState::Synced
        } else {
            SyncState::Syncing
        };
        if next != self.state {
            match next {
                SyncState::Synced => info!(peer = %self.peer_label(), "synced with peer"),
                _ => debug!(peer = %self.peer_label(), "tips differ, syncing"),
            }
            self.state = next;
        }
        Ok(())
    }

    fn on_get_blocks_before(&mut self, hash: VertexId, count: u32) -> Result<(), BraidError> {
        let count = count.min(MAX_BLOCKS_PER_BATCH) as usize;
        let engine = self.ctx.engine.lock();
        let reply = if engine.exists(&hash)? {
            Message::Blocks {
                hash,
                blocks: engine.get_blocks_before(&hash, count),
            }
        } else {
            Message::NotFound { hash }
        };
        drop(engine);
        self.outbox.push(reply);
        Ok(())
    }

    fn on_blocks(
        &mut self,
        hash: VertexId,
        blocks: Vec<VertexId>,
        now: Instant,
    ) -> Result<(), BraidError> {
        if blocks.len() > MAX_BLOCKS_PER_BATCH as usize {
            return Err(BraidError::ProtocolViolation(format!(
                "BLOCKS with {} ids",
                blocks.len()
            )));
        }
        let Some(mut chain) = self.walks.remove(&hash) else {
            debug!(peer = %self.peer_label(), hash = %hash.short(), "unexpected BLOCKS");
            return Ok(());
        };
        self.pending.remove(&Request::BlocksBefore(hash));

        let mut reached_known = false;
        {
            let engine = self.ctx.engine.lock();
            for id in &blocks {
                if engine.exists(id)? {
                    reached_known = true;
                    break;
                }
                chain.push(*id);
            }
        }

        let batch = self.ctx.config.blocks_per_batch.min(MAX_BLOCKS_PER_BATCH);
        if !reached_known && blocks.len() >= batch as usize {
            if let Some(&cursor) = chain.last() {
                trace!(peer = %self.peer_label(), cursor = %cursor.short(), "walking further back");
                self.walks.insert(cursor, chain);
                self.request(
                    Request::BlocksBefore(cursor),
                    Message::GetBlocksBefore { hash: cursor, count: batch },
                    now,
                );
                return Ok(());
            }
        }

        debug!(peer = %self.peer_label(), missing = chain.len(), "found common ancestor");
        for id in chain.into_iter().rev() {
            self.want(id, false)?;
        }
        Ok(())
    }

    fn on_get_data(&mut self, hash: VertexId) -> Result<(), BraidError> {
        let vertex = self.ctx.engine.lock().get(&hash)?;
        match vertex {
            Some(vertex) => {
                self.remember(hash);
                self.outbox.push(Message::Data { vertex });
            }
            None => self.outbox.push(Message::NotFound { hash }),
        }
        Ok(())
    }

    fn on_data(&mut self, vertex: Vertex, now: Instant) -> Result<(), BraidError> {
        let id = vertex.hash;
        let requested = self.pending.remove(&Request::Data(id)).is_some();
        trace!(peer = %self.peer_label(), vertex = %id.short(), requested, "vertex data");
        self.remember(id);
        self.process_vertex(vertex)?;

        // Caught up on everything asked for: check whether tips now match.
        self.flush_requests(now);
        if self.state == SyncState::Syncing && self.is_quiescent() {
            self.poll_tips(now);
        }
        Ok(())
    }

    fn on_not_found(&mut self, hash: VertexId) {
        let had_data = self.pending.remove(&Request::Data(hash)).is_some();
        let had_walk = self.pending.remove(&Request::BlocksBefore(hash)).is_some();
        self.walks.remove(&hash);
        if !had_data && !had_walk {
            debug!(peer = %self.peer_label(), hash = %hash.short(), "unexpected NOT-FOUND");
            return;
        }
        if let Some(orphans) = self.waiting_on.remove(&hash) {
            for orphan in orphans {
                if self.remove_orphan(&orphan).is_some() {
                    debug!(vertex = %orphan.short(), missing = %hash.short(), "dropping orphan");
                }
            }
        }
    }

    // ── Acceptance ───────────────────────────────────────────────────────────

    /// Hand `vertex` to the engine, then retry every orphan it unblocks.
    fn process_vertex(&mut self, vertex: Vertex) -> Result<(), BraidError> {
        let mut work = vec![vertex];
        while let Some(vertex) = work.pop() {
            let id = vertex.hash;
            let (result, missing) = {
                let mut engine = self.ctx.engine.lock();
                let result = engine.accept(vertex.clone(), unix_now());
                let missing = match &result {
                    Err(e) if e.is_unknown_parent() => engine.missing_dependencies(&vertex)?,
                    _ => Vec::new(),
                };
                (result, missing)
            };

            match result {
                Ok(outcome) => {
                    if outcome == AcceptOutcome::Accepted {
                        debug!(peer = %self.peer_label(), vertex = %id.short(), "accepted from peer");
                    }
                    if let Some(unblocked) = self.waiting_on.remove(&id) {
                        work.extend(unblocked.iter().filter_map(|o| self.remove_orphan(o)));
                    }
                }
                Err(e) if e.is_unknown_parent() && !missing.is_empty() => {
                    self.buffer_orphan(vertex, missing)?;
                }
                Err(e @ (BraidError::Storage(_) | BraidError::Serialization(_) | BraidError::Io(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(peer = %self.peer_label(), vertex = %id.short(), error = %e, "rejected vertex from peer");
                }
            }
        }
        Ok(())
    }

    fn buffer_orphan(&mut self, vertex: Vertex, missing: Vec<VertexId>) -> Result<(), BraidError> {
        let id = vertex.hash;
        if let Some(previous) = self.remove_orphan(&id) {
            trace!(vertex = %previous.hash.short(), "re-buffering orphan");
        }
        while self.orphans.len() >= self.ctx.config.max_orphans.max(1) {
            if !self.evict_oldest_orphan() {
                break;
            }
        }
        debug!(
            peer = %self.peer_label(),
            vertex = %id.short(),
            missing = missing.len(),
            "buffering vertex with missing dependencies"
        );
        for dep in &missing {
            let waiting = self.waiting_on.entry(*dep).or_default();
            if !waiting.contains(&id) {
                waiting.push(id);
            }
        }
        self.orphans.insert(
            id,
            Orphan {
                vertex,
                missing: missing.clone(),
            },
        );
        self.orphan_order.push_back(id);
        if self.orphan_order.len() > 2 * self.orphans.len() + 64 {
            let orphans = &self.orphans;
            self.orphan_order.retain(|o| orphans.contains_key(o));
        }
        for dep in missing {
            self.want(dep, true)?;
        }
        if self.state == SyncState::Synced {
            debug!(peer = %self.peer_label(), "missing ancestors, resyncing");
            self.state = SyncState::Syncing;
        }
        Ok(())
    }

    /// Take `id` out of the buffer and out of every list it waits in.
    fn remove_orphan(&mut self, id: &VertexId) -> Option<Vertex> {
        let orphan = self.orphans.remove(id)?;
        for dep in &orphan.missing {
            if let Some(waiting) = self.waiting_on.get_mut(dep) {
                waiting.retain(|w| w != id);
                if waiting.is_empty() {
                    self.waiting_on.remove(dep);
                }
            }
        }
        if self.orphans.is_empty() {
            self.orphan_order.clear();
        }
        Some(orphan.vertex)
    }

    /// Drop the longest-buffered orphan, remembering its id for a later
    /// fetch. Returns false if nothing was buffered.
    fn evict_oldest_orphan(&mut self) -> bool {
        while let Some(id) = self.orphan_order.pop_front() {
            if self.orphans.contains_key(&id) {
                debug!(peer = %self.peer_label(), vertex = %id.short(), "orphan buffer full, evicting");
                self.evict_orphan(id);
                return true;
            }
        }
        false
    }

    /// Evict `id` together with every orphan waiting on it. Waiters are
    /// recorded before `id`, so `id` is fetched again first.
    fn evict_orphan(&mut self, id: VertexId) {
        if let Some(waiters) = self.waiting_on.get(&id).cloned() {
            for waiter in waiters {
                self.evict_orphan(waiter);
            }
        }
        if self.remove_orphan(&id).is_some() && self.evicted.len() < self.ctx.config.known_cache_size {
            self.evicted.push(id);
        }
    }

    /// Once the buffer has drained, queue evicted orphans again, most
    /// recently evicted first: those sit closest to what was just accepted.
    fn refetch_evicted(&mut self) -> Result<(), BraidError> {
        if !self.orphans.is_empty() || self.evicted.is_empty() {
            return Ok(());
        }
        let evicted = std::mem::take(&mut self.evicted);
        debug!(peer = %self.peer_label(), count = evicted.len(), "fetching evicted orphans again");
        for id in evicted.into_iter().rev() {
            self.want(id, false)?;
        }
        Ok(())
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    fn request(&mut self, key: Request, message: Message, now: Instant) {
        if self.pending.contains_key(&key) {
            return;
        }
        self.outbox.push(message.clone());
        self.pending.insert(
            key,
            Pending {
                message,
                sent_at: now,
                retries: 0,
            },
        );
    }

    fn poll_tips(&mut self, now: Instant) {
        self.last_tips_request = Some(now);
        self.request(Request::Tips, Message::GetTips, now);
    }

    fn is_requested(&self, id: &VertexId) -> bool {
        self.pending.contains_key(&Request::Data(*id))
            || self.orphans.contains_key(id)
            || self.wanted.contains(id)
    }

    /// Queue `id` for GET-DATA unless it is known, buffered or already asked
    /// for. Priority requests jump the queue.
    fn want(&mut self, id: VertexId, priority: bool) -> Result<(), BraidError> {
        if self.pending.contains_key(&Request::Data(id)) || self.orphans.contains_key(&id) {
            return Ok(());
        }
        if let Some(pos) = self.wanted.iter().position(|w| *w == id) {
            if priority {
                self.wanted.remove(pos);
                self.wanted.push_front(id);
            }
            return Ok(());
        }
        if self.ctx.engine.lock().exists(&id)? {
            return Ok(());
        }
        if priority {
            self.wanted.push_front(id);
        } else {
            self.wanted.push_back(id);
        }
        Ok(())
    }

    fn flush_requests(&mut self, now: Instant) {
        if !self.is_handshaken() {
            return;
        }
        let mut in_flight = self
            .pending
            .keys()
            .filter(|k| matches!(k, Request::Data(_)))
            .count();
        while in_flight < self.ctx.config.max_in_flight {
            let Some(id) = self.wanted.pop_front() else {
                break;
            };
            self.request(Request::Data(id), Message::GetData { hash: id }, now);
            in_flight += 1;
        }
    }

    fn remember(&mut self, id: VertexId) {
        if !self.known_by_peer.insert(id) {
            return;
        }
        self.known_order.push_back(id);
        while self.known_order.len() > self.ctx.config.known_cache_size {
            if let Some(old) = self.known_order.pop_front() {
                self.known_by_peer.remove(&old);
            }
        }
    }
}

/// The tips put in a TIPS message: the smallest `MAX_TIPS_ADVERTISED` ids.
/// Two nodes with more tips than that are compared on this prefix only.
fn advertised(tips: &BTreeSet<VertexId>) -> impl Iterator<Item = VertexId> + '_ {
    tips.iter().take(MAX_TIPS_ADVERTISED).copied()
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.close();
    }
}
