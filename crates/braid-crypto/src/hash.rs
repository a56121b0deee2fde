use braid_core::{PeerId, Vertex, VertexId};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Vertex id: BLAKE3(body_bytes || nonce_le).
pub fn vertex_id(body_bytes: &[u8], nonce: u64) -> VertexId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(body_bytes);
    hasher.update(&nonce.to_le_bytes());
    VertexId::from_bytes(*hasher.finalize().as_bytes())
}

/// Recompute the id a vertex should carry from its current fields.
pub fn compute_vertex_id(vertex: &Vertex) -> VertexId {
    vertex_id(&vertex.body_bytes(), vertex.nonce)
}

/// Derive a PeerId from a raw Dilithium public key.
pub fn peer_id_from_pubkey(pubkey_bytes: &[u8]) -> PeerId {
    PeerId::from_bytes(blake3_hash(pubkey_bytes))
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Public-key hash used by pay-to-public-key-hash scripts:
/// RIPEMD160(SHA256(data)).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(sha256(data)).into()
}
