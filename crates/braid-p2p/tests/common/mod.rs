//! Shared fixtures for the sync tests: nodes with an in-memory store, a toy
//! wallet, and an in-process network that pumps encoded messages between
//! sync managers while advancing a simulated clock.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use braid_consensus::PowVerifier;
use braid_core::{OutPoint, TxInput, TxOutput, Value, Vertex, VertexId, VertexKind};
use braid_crypto::{seal_vertex, EcdsaKeyPair, PeerKeyPair};
use braid_dag::MemoryStore;
use braid_genesis::NetworkParams;
use braid_p2p::{unix_now, Message, NodeContext, RelayReceiver, SyncConfig, SyncManager};
use braid_script::{p2pkh, p2pkh_unlock};
use braid_state::{AcceptOutcome, PubSub, ValidationEngine};

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// Holds the key the genesis output is locked to, and the single coin it
/// keeps moving from transaction to transaction.
pub struct Wallet {
    pub key: EcdsaKeyPair,
    pub coin: Option<(OutPoint, Value)>,
}

pub fn network() -> (NetworkParams, Wallet) {
    let key = EcdsaKeyPair::generate();
    let params = NetworkParams::unittests(p2pkh(&key.pubkey_hash()));
    (params, Wallet { key, coin: None })
}

pub fn node(params: &NetworkParams, config: SyncConfig) -> NodeContext {
    let engine = ValidationEngine::open(
        Box::new(MemoryStore::new()),
        params.clone(),
        Arc::new(PowVerifier),
        Arc::new(PubSub::new()),
    )
    .expect("open engine");
    NodeContext::new(engine, PeerKeyPair::generate(), config)
}

/// Produce, seal and submit one block on top of `ctx`'s best block.
pub fn mine(ctx: &NodeContext) -> Vertex {
    mine_paying(ctx, vec![0x51])
}

/// Like [`mine`], with the reward locked to `script`. Two fresh nodes mining
/// in the same second only build distinct blocks if their scripts differ.
pub fn mine_paying(ctx: &NodeContext, script: Vec<u8>) -> Vertex {
    let mut block = ctx
        .engine
        .lock()
        .block_template(vec![TxOutput::new(6_400, script)], unix_now())
        .expect("block template");
    assert!(seal_vertex(&mut block));
    assert_eq!(ctx.submit(block.clone()).unwrap(), AcceptOutcome::Accepted);
    block
}

/// Move the wallet's coin to a fresh output of the same value.
pub fn pay(ctx: &NodeContext, wallet: &mut Wallet) -> Vertex {
    let (outpoint, value) = match wallet.coin {
        Some(coin) => coin,
        None => {
            let genesis = ctx.engine.lock().genesis();
            (OutPoint::new(genesis, 0), ctx.params.genesis_supply)
        }
    };
    let lock = p2pkh(&wallet.key.pubkey_hash());
    let mut tx = ctx
        .engine
        .lock()
        .transaction_template(
            vec![TxInput::new(outpoint, vec![])],
            vec![TxOutput::new(value, lock)],
            unix_now(),
        )
        .expect("transaction template");
    let sig = wallet.key.sign_transaction(&tx);
    tx.inputs[0].data = p2pkh_unlock(&sig, &wallet.key.public_key_bytes()).unwrap();
    assert!(seal_vertex(&mut tx));
    assert_eq!(ctx.submit(tx.clone()).unwrap(), AcceptOutcome::Accepted);
    wallet.coin = Some((OutPoint::new(tx.hash, 0), value));
    tx
}

pub fn tips(ctx: &NodeContext) -> (BTreeSet<VertexId>, BTreeSet<VertexId>) {
    let engine = ctx.engine.lock();
    (
        engine.tips(VertexKind::Block).clone(),
        engine.tips(VertexKind::Transaction).clone(),
    )
}

pub fn count(ctx: &NodeContext, kind: VertexKind) -> usize {
    ctx.engine.lock().count(kind).unwrap()
}

// ── Simulated network ─────────────────────────────────────────────────────────

struct Endpoint {
    manager: SyncManager,
    relay: RelayReceiver,
    /// Encoded frames waiting to be delivered to this endpoint.
    inbox: VecDeque<Vec<u8>>,
}

pub struct Link {
    pub a: usize,
    pub b: usize,
    ends: [Endpoint; 2],
}

impl Link {
    pub fn manager(&self, side: usize) -> &SyncManager {
        &self.ends[side].manager
    }

    /// Deliver everything queued and every pending relay once. Returns
    /// whether any frame moved.
    fn pump(&mut self, now: Instant) -> bool {
        let mut moved = false;
        for side in 0..2 {
            let other = 1 - side;
            while let Ok(vertex) = self.ends[side].relay.try_recv() {
                let out = self.ends[side].manager.on_relay(vertex);
                enqueue(&mut self.ends[other].inbox, out);
            }
            let frames: Vec<Vec<u8>> = self.ends[side].inbox.drain(..).collect();
            for frame in frames {
                moved = true;
                let out = self.ends[side]
                    .manager
                    .handle_bytes(&frame, now)
                    .expect("sync protocol error");
                enqueue(&mut self.ends[other].inbox, out);
            }
        }
        moved
    }

    fn tick(&mut self, now: Instant) {
        for side in 0..2 {
            let other = 1 - side;
            let out = self.ends[side].manager.tick(now).expect("tick failed");
            enqueue(&mut self.ends[other].inbox, out);
        }
    }
}

fn enqueue(inbox: &mut VecDeque<Vec<u8>>, messages: Vec<Message>) {
    for msg in messages {
        inbox.push_back(msg.to_bytes().expect("encode"));
    }
}

pub struct Sim {
    pub nodes: Vec<NodeContext>,
    pub links: Vec<Link>,
    pub now: Instant,
}

impl Sim {
    pub fn new(nodes: Vec<NodeContext>) -> Self {
        Self {
            nodes,
            links: Vec::new(),
            now: Instant::now(),
        }
    }

    /// Connect two nodes and queue both HELLOs. Returns the link index.
    pub fn connect(&mut self, a: usize, b: usize) -> usize {
        let (mut manager_a, relay_a) = SyncManager::new(self.nodes[a].clone());
        let (mut manager_b, relay_b) = SyncManager::new(self.nodes[b].clone());
        let mut inbox_a = VecDeque::new();
        let mut inbox_b = VecDeque::new();
        enqueue(&mut inbox_b, manager_a.start(self.now));
        enqueue(&mut inbox_a, manager_b.start(self.now));
        self.links.push(Link {
            a,
            b,
            ends: [
                Endpoint {
                    manager: manager_a,
                    relay: relay_a,
                    inbox: inbox_a,
                },
                Endpoint {
                    manager: manager_b,
                    relay: relay_b,
                    inbox: inbox_b,
                },
            ],
        });
        self.links.len() - 1
    }

    /// Queue `msg` for delivery to side `to` of `link`, as if the other side
    /// had sent it.
    pub fn inject(&mut self, link: usize, to: usize, msg: Message) {
        enqueue(&mut self.links[link].ends[to].inbox, vec![msg]);
    }

    /// Throw away relays pending on side `side` of `link`, as if they were
    /// lost in transit.
    pub fn discard_relays(&mut self, link: usize, side: usize) {
        while self.links[link].ends[side].relay.try_recv().is_ok() {}
    }

    /// Deliver messages until no link has anything left in flight.
    pub fn settle(&mut self) {
        for _ in 0..10_000 {
            let mut moved = false;
            for link in &mut self.links {
                moved |= link.pump(self.now);
            }
            if !moved {
                return;
            }
        }
        panic!("network did not settle");
    }

    /// Settle, then advance the clock one poll interval and tick every
    /// manager, up to `rounds` times or until every pair of linked nodes has
    /// identical tips and every manager reports synced.
    pub fn run(&mut self, rounds: usize) -> bool {
        for _ in 0..rounds {
            self.settle();
            if self.converged() {
                return true;
            }
            let interval = self.nodes[0].config.synced_poll_interval;
            self.now += interval;
            for link in &mut self.links {
                link.tick(self.now);
            }
        }
        self.settle();
        self.converged()
    }

    pub fn converged(&self) -> bool {
        self.links.iter().all(|link| {
            link.ends.iter().all(|end| end.manager.is_synced())
                && tips(&self.nodes[link.a]) == tips(&self.nodes[link.b])
        })
    }
}
