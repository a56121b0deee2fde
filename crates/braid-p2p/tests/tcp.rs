//! Two nodes over real loopback sockets.
//!
//! Run with:
//!   cargo test -p braid-p2p --test tcp

mod common;

use std::time::Duration;

use braid_core::VertexKind;
use braid_p2p::{ConnectionManager, SyncConfig, SyncState};

use common::{count, mine, network, node, tips};

fn loopback_config() -> SyncConfig {
    SyncConfig {
        listen_addr: "127.0.0.1:0".into(),
        tick_interval: Duration::from_millis(20),
        tips_poll_interval: Duration::from_millis(100),
        synced_poll_interval: Duration::from_millis(200),
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn nodes_sync_over_tcp() {
    let (params, _) = network();
    let a = node(&params, loopback_config());
    let b = node(&params, loopback_config());
    for _ in 0..5 {
        mine(&a);
    }

    let server = ConnectionManager::bind(a.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_status = server.sync_status();
    tokio::spawn(server.run());

    let client = ConnectionManager::bind(b.clone()).await.unwrap();
    let client_status = client.sync_status();
    assert!(!client_status.is_synced());
    client.dial(addr.to_string());
    tokio::spawn(client.run());

    let synced = tokio::time::timeout(Duration::from_secs(20), async {
        while tips(&a) != tips(&b) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(synced.is_ok(), "nodes did not converge");
    assert_eq!(count(&b, VertexKind::Block), 6);

    // Both connection managers report the other side as a synced peer.
    let reported = tokio::time::timeout(Duration::from_secs(20), async {
        while !(server_status.is_synced() && client_status.is_synced()) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(reported.is_ok(), "sync status never reported synced");
    assert_eq!(
        client_status.peers(),
        vec![(a.identity.peer_id, SyncState::Synced)]
    );
    assert_eq!(server_status.peer_count(), 1);

    // Blocks mined after the initial sync are relayed.
    let block = mine(&a);
    let relayed = tokio::time::timeout(Duration::from_secs(20), async {
        while !b.engine.lock().exists(&block.hash).unwrap() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(relayed.is_ok(), "new block was not relayed");
}
