use braid_core::Vertex;
use braid_crypto::verify_vertex_pow;

/// Proof-of-work check consulted by the validation engine. The engine only
/// consumes the verdict; how work is proven is up to the implementation.
pub trait WorkVerifier: Send + Sync {
    fn verify_work(&self, vertex: &Vertex) -> bool;
}

/// SHA3-256 leading-zero-bits check: `ceil(weight)` bits over body || nonce.
#[derive(Clone, Copy, Debug, Default)]
pub struct PowVerifier;

impl WorkVerifier for PowVerifier {
    fn verify_work(&self, vertex: &Vertex) -> bool {
        verify_vertex_pow(vertex)
    }
}
