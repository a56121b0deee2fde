pub mod dilithium;
pub mod ecdsa;
pub mod hash;
pub mod identity;
pub mod pow;

pub use dilithium::{verify_signature, SignatureError};
pub use ecdsa::{sighash_digest, verify_ecdsa, EcdsaKeyPair};
pub use hash::{
    blake3_hash, compute_vertex_id, hash160, peer_id_from_pubkey, sha256, sha256d, vertex_id,
};
pub use identity::{random_challenge, verify_peer_proof, PeerIdentityFile, PeerKeyPair};
pub use pow::{difficulty_for_weight, mine_pow, seal_vertex, verify_pow, verify_vertex_pow};
