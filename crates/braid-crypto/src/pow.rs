use braid_core::Vertex;
use sha3::{Digest, Sha3_256};

use crate::hash::compute_vertex_id;

/// Leading zero bits a vertex of `weight` must show: `ceil(weight)`,
/// clamped to the 256-bit digest.
pub fn difficulty_for_weight(weight: f64) -> u32 {
    if !weight.is_finite() || weight <= 0.0 {
        return 0;
    }
    weight.ceil().min(256.0) as u32
}

/// Verify that sha3_256(body_bytes || pow_nonce) has `difficulty` leading zero bits.
pub fn verify_pow(body_bytes: &[u8], pow_nonce: u64, difficulty: u32) -> bool {
    let hash = pow_hash(body_bytes, pow_nonce);
    leading_zero_bits(&hash) >= difficulty
}

/// Find a `pow_nonce` such that sha3_256(body_bytes || nonce) has >= `difficulty`
/// leading zero bits, starting the search at `start`. Returns `None` only if
/// the whole nonce range above `start` is exhausted.
pub fn mine_pow(body_bytes: &[u8], difficulty: u32, start: u64) -> Option<u64> {
    (start..=u64::MAX).find(|&nonce| verify_pow(body_bytes, nonce, difficulty))
}

/// Check a vertex's nonce against its own weight.
pub fn verify_vertex_pow(vertex: &Vertex) -> bool {
    verify_pow(
        &vertex.body_bytes(),
        vertex.nonce,
        difficulty_for_weight(vertex.weight),
    )
}

/// Search a nonce for `vertex` and set its hash. Returns `false` if no nonce
/// satisfied the weight; the vertex is left unchanged in that case.
pub fn seal_vertex(vertex: &mut Vertex) -> bool {
    let body = vertex.body_bytes();
    match mine_pow(&body, difficulty_for_weight(vertex.weight), 0) {
        Some(nonce) => {
            vertex.nonce = nonce;
            vertex.hash = compute_vertex_id(vertex);
            true
        }
        None => false,
    }
}

fn pow_hash(body_bytes: &[u8], nonce: u64) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(body_bytes);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

fn leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut count = 0u32;
    for byte in hash {
        let lz = byte.leading_zeros();
        count += lz;
        if lz < 8 {
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{TxOutput, VertexId};

    #[test]
    fn pow_round_trip() {
        let body = b"test vertex body";
        let difficulty = 8; // easy for tests
        let nonce = mine_pow(body, difficulty, 0).unwrap();
        assert!(verify_pow(body, nonce, difficulty));
    }

    #[test]
    fn leading_zeros_correct() {
        let mut hash = [0u8; 32];
        hash[0] = 0b00001111;
        assert_eq!(leading_zero_bits(&hash), 4);

        let mut hash2 = [0u8; 32];
        hash2[1] = 0b00000001;
        assert_eq!(leading_zero_bits(&hash2), 15);
    }

    #[test]
    fn difficulty_rounds_weight_up() {
        assert_eq!(difficulty_for_weight(0.0), 0);
        assert_eq!(difficulty_for_weight(1.2), 2);
        assert_eq!(difficulty_for_weight(8.0), 8);
        assert_eq!(difficulty_for_weight(f64::NAN), 0);
        assert_eq!(difficulty_for_weight(1e9), 256);
    }

    #[test]
    fn sealed_vertex_verifies() {
        let mut block = Vertex::new_block(
            vec![VertexId::from_bytes([1u8; 32])],
            6.0,
            1_700_000_000,
            vec![TxOutput::new(50, vec![0x51])],
        );
        assert!(seal_vertex(&mut block));
        assert!(verify_vertex_pow(&block));
        assert_eq!(block.hash, compute_vertex_id(&block));
    }
}
