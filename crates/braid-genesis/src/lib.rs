//! braid-genesis
//!
//! Network parameters and the genesis set every DAG grows from.
//!
//! The genesis set is three parentless vertices derived only from
//! `NetworkParams`, so every node with the same parameters computes the same
//! ids:
//!
//! 1. Genesis block: pays `genesis_supply` to `genesis_output_script`
//! 2. Genesis transaction: at `genesis_timestamp + 1`, no inputs/outputs
//! 3. Genesis transaction: at `genesis_timestamp + 2`, no inputs/outputs
//!
//! Genesis vertices are written without validation and carry no proof of work.

pub mod params;

pub use params::NetworkParams;

use braid_core::{TxOutput, Vertex, VertexId};
use braid_crypto::compute_vertex_id;
use tracing::debug;

fn sealed(mut vertex: Vertex) -> Vertex {
    vertex.hash = compute_vertex_id(&vertex);
    vertex
}

/// The genesis block.
pub fn genesis_block(params: &NetworkParams) -> Vertex {
    sealed(Vertex::new_block(
        Vec::new(),
        params.min_block_weight,
        params.genesis_timestamp,
        vec![TxOutput::new(
            params.genesis_supply,
            params.genesis_output_script.clone(),
        )],
    ))
}

/// The two genesis transactions, ordered by timestamp.
pub fn genesis_transactions(params: &NetworkParams) -> [Vertex; 2] {
    let tx = |offset: i64| {
        sealed(Vertex::new_transaction(
            Vec::new(),
            params.min_tx_weight,
            params.genesis_timestamp + offset,
            Vec::new(),
            Vec::new(),
        ))
    };
    [tx(1), tx(2)]
}

/// Block first, then both transactions.
pub fn genesis_vertices(params: &NetworkParams) -> Vec<Vertex> {
    let [tx1, tx2] = genesis_transactions(params);
    let vertices = vec![genesis_block(params), tx1, tx2];
    debug!(
        network = %params.network,
        block = %vertices[0].hash.short(),
        "derived genesis set"
    );
    vertices
}

/// Id of the genesis block, advertised in HELLO.
pub fn genesis_id(params: &NetworkParams) -> VertexId {
    genesis_block(params).hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn genesis_is_deterministic_and_distinct() {
        let params = NetworkParams::testnet();
        let a = genesis_vertices(&params);
        let b = genesis_vertices(&params);
        assert_eq!(a, b);
        let ids: HashSet<_> = a.iter().map(|v| v.hash).collect();
        assert_eq!(ids.len(), 3);
        assert!(a[0].is_block() && a[1].is_transaction() && a[2].is_transaction());
        assert!(a.iter().all(|v| v.is_genesis()));
    }

    #[test]
    fn genesis_depends_on_params() {
        let testnet = NetworkParams::testnet();
        let mut other = testnet.clone();
        other.genesis_supply += 1;
        assert_ne!(genesis_id(&testnet), genesis_id(&other));
        // Transactions carry no value, only timestamps.
        assert_eq!(
            genesis_transactions(&testnet)[0].hash,
            genesis_transactions(&other)[0].hash
        );
    }

    #[test]
    fn genesis_block_pays_supply() {
        let params = NetworkParams::unittests(vec![0x51]);
        let block = genesis_block(&params);
        assert_eq!(block.output_total(), Some(params.genesis_supply));
        assert_eq!(block.outputs[0].script, vec![0x51]);
    }
}
