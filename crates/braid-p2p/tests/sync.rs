//! Reconciliation scenarios between in-process nodes.
//!
//! Every message crosses the wire codec; the clock is simulated, so the
//! tests run as fast as validation allows.
//!
//! Run with:
//!   cargo test -p braid-p2p --test sync

mod common;

use braid_core::VertexKind;
use braid_p2p::{Message, SyncConfig, SyncState};

use common::{count, mine, mine_paying, network, node, pay, tips, Sim};

// ── Initial sync ──────────────────────────────────────────────────────────────

#[test]
fn genesis_only_nodes_are_synced_after_handshake() {
    let (params, _) = network();
    let mut sim = Sim::new(vec![
        node(&params, SyncConfig::default()),
        node(&params, SyncConfig::default()),
    ]);
    sim.connect(0, 1);
    assert!(sim.run(3));
    assert_eq!(sim.links[0].manager(0).state(), SyncState::Synced);
    assert_eq!(count(&sim.nodes[1], VertexKind::Block), 1);
}

#[test]
fn fresh_node_catches_up_on_twenty_blocks() {
    let (params, _) = network();
    // Small batches so the backward walk takes several round trips.
    let config = SyncConfig {
        blocks_per_batch: 4,
        ..SyncConfig::default()
    };
    let a = node(&params, config.clone());
    for _ in 0..20 {
        mine(&a);
    }
    let mut sim = Sim::new(vec![a, node(&params, config)]);
    sim.connect(0, 1);

    assert!(sim.run(10));
    assert_eq!(tips(&sim.nodes[1]), tips(&sim.nodes[0]));
    assert_eq!(count(&sim.nodes[1], VertexKind::Block), 21);
    assert_eq!(
        sim.nodes[1].engine.lock().best_block(),
        sim.nodes[0].engine.lock().best_block()
    );
}

#[test]
fn blocks_and_transactions_interleaved() {
    let (params, mut wallet) = network();
    let a = node(&params, SyncConfig::default());
    for _ in 0..15 {
        mine(&a);
    }
    for _ in 0..3 {
        pay(&a, &mut wallet);
    }
    for _ in 0..4 {
        mine(&a);
    }
    for _ in 0..5 {
        pay(&a, &mut wallet);
    }

    let mut sim = Sim::new(vec![a, node(&params, SyncConfig::default())]);
    sim.connect(0, 1);

    assert!(sim.run(10));
    assert_eq!(tips(&sim.nodes[1]), tips(&sim.nodes[0]));
    assert_eq!(count(&sim.nodes[1], VertexKind::Block), 20);
    assert_eq!(count(&sim.nodes[1], VertexKind::Transaction), 10);
}

#[test]
fn diverged_nodes_merge_both_histories() {
    let (params, _) = network();
    let config = SyncConfig {
        blocks_per_batch: 3,
        ..SyncConfig::default()
    };
    let a = node(&params, config.clone());
    let b = node(&params, config);
    let a_tip = (0..7).map(|_| mine_paying(&a, vec![0x51])).last().unwrap();
    let b_tip = (0..4).map(|_| mine_paying(&b, vec![0x52])).last().unwrap();
    assert_ne!(tips(&a), tips(&b));

    let mut sim = Sim::new(vec![a, b]);
    sim.connect(0, 1);
    assert!(sim.run(10));

    for node in &sim.nodes {
        let (block_tips, _) = tips(node);
        assert_eq!(block_tips.len(), 2);
        assert!(block_tips.contains(&a_tip.hash));
        assert!(block_tips.contains(&b_tip.hash));
        assert_eq!(count(node, VertexKind::Block), 12);
        // The longer branch carries more weight on both sides.
        assert_eq!(node.engine.lock().best_block().map(|b| b.0), Some(a_tip.hash));
    }
}

#[test]
fn transaction_history_deeper_than_the_orphan_buffer() {
    let (params, mut wallet) = network();
    let config = SyncConfig {
        max_orphans: 8,
        ..SyncConfig::default()
    };
    let a = node(&params, config.clone());
    for _ in 0..40 {
        pay(&a, &mut wallet);
    }

    let mut sim = Sim::new(vec![a, node(&params, config)]);
    let link = sim.connect(0, 1);
    assert!(sim.run(10));
    assert_eq!(tips(&sim.nodes[1]), tips(&sim.nodes[0]));
    assert_eq!(count(&sim.nodes[1], VertexKind::Transaction), 42);
    assert_eq!(sim.links[link].manager(1).orphan_count(), 0);
    assert_eq!(sim.links[link].manager(1).state(), SyncState::Synced);
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[test]
fn vertices_propagate_along_a_chain_of_nodes() {
    let (params, mut wallet) = network();
    let mut sim = Sim::new(vec![
        node(&params, SyncConfig::default()),
        node(&params, SyncConfig::default()),
        node(&params, SyncConfig::default()),
    ]);
    // A ── B ── C, no direct A ── C link.
    sim.connect(0, 1);
    sim.connect(1, 2);
    assert!(sim.run(3));

    let block = mine(&sim.nodes[0]);
    let tx = pay(&sim.nodes[0], &mut wallet);
    assert!(sim.run(5));

    for node in &sim.nodes {
        let (block_tips, tx_tips) = tips(node);
        assert!(block_tips.contains(&block.hash));
        assert!(tx_tips.contains(&tx.hash));
    }
    assert_eq!(tips(&sim.nodes[2]), tips(&sim.nodes[0]));
}

#[test]
fn relayed_vertex_with_unknown_parent_triggers_resync() {
    let (params, _) = network();
    let mut sim = Sim::new(vec![
        node(&params, SyncConfig::default()),
        node(&params, SyncConfig::default()),
    ]);
    let link = sim.connect(0, 1);
    assert!(sim.run(3));

    // B never hears about the first block; the second arrives on its own.
    let first = mine(&sim.nodes[0]);
    let second = mine(&sim.nodes[0]);
    sim.discard_relays(link, 0);
    sim.inject(link, 1, Message::Data { vertex: second.clone() });

    assert!(sim.run(5));
    let engine = sim.nodes[1].engine.lock();
    assert!(engine.exists(&first.hash).unwrap());
    assert!(engine.exists(&second.hash).unwrap());
    assert_eq!(engine.best_block().map(|b| b.0), Some(second.hash));
}

// ── Robustness ────────────────────────────────────────────────────────────────

#[test]
fn invalid_vertex_from_peer_is_dropped_and_sync_continues() {
    let (params, _) = network();
    let mut sim = Sim::new(vec![
        node(&params, SyncConfig::default()),
        node(&params, SyncConfig::default()),
    ]);
    let link = sim.connect(0, 1);
    assert!(sim.run(3));

    let block = mine(&sim.nodes[0]);
    sim.discard_relays(link, 0);
    let mut forged = block.clone();
    forged.weight += 1.0;
    sim.inject(link, 1, Message::Data { vertex: forged.clone() });
    sim.settle();

    assert!(!sim.nodes[1].engine.lock().exists(&forged.hash).unwrap());
    assert_eq!(sim.links[link].manager(1).orphan_count(), 0);
    assert_ne!(sim.links[link].manager(1).state(), SyncState::Closed);

    // The genuine block still arrives through the next tips poll.
    assert!(sim.run(5));
    assert!(sim.nodes[1].engine.lock().exists(&block.hash).unwrap());
}

#[test]
fn redelivery_changes_nothing() {
    let (params, mut wallet) = network();
    let a = node(&params, SyncConfig::default());
    mine(&a);
    pay(&a, &mut wallet);
    let block = mine(&a);

    let mut sim = Sim::new(vec![a, node(&params, SyncConfig::default())]);
    let link = sim.connect(0, 1);
    assert!(sim.run(5));
    let before = tips(&sim.nodes[1]);
    let blocks = count(&sim.nodes[1], VertexKind::Block);

    sim.inject(link, 1, Message::Data { vertex: block.clone() });
    sim.inject(link, 1, Message::Data { vertex: block.clone() });
    assert!(sim.run(3));
    assert_eq!(tips(&sim.nodes[1]), before);
    assert_eq!(count(&sim.nodes[1], VertexKind::Block), blocks);

    // A second connection between the same nodes transfers nothing new.
    sim.connect(0, 1);
    assert!(sim.run(3));
    assert_eq!(count(&sim.nodes[1], VertexKind::Block), blocks);
    assert_eq!(
        sim.nodes[0].submit(block).unwrap(),
        braid_state::AcceptOutcome::AlreadyKnown
    );
}
