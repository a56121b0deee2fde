//! secp256k1 ECDSA over the sighash-all digest, as used by `OP_CHECKSIG`.

use braid_core::Vertex;
use once_cell::sync::Lazy;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

use crate::dilithium::SignatureError;
use crate::hash::{hash160, sha256d};

/// Signing and verification context, shared by every thread.
static SECP: Lazy<Secp256k1<secp256k1::All>> = Lazy::new(Secp256k1::new);

/// Digest a transaction's signature-hash preimage is signed as.
pub fn sighash_digest(tx: &Vertex) -> [u8; 32] {
    sha256d(&tx.sighash_all())
}

/// Verify a DER signature over `digest` with a serialized public key.
///
/// Returns `false` for malformed keys or signatures instead of an error:
/// CHECKSIG turns any failure into a falsy stack value.
pub fn verify_ecdsa(pubkey: &[u8], der_sig: &[u8], digest: &[u8; 32]) -> bool {
    let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(mut sig) = Signature::from_der(der_sig) else {
        return false;
    };
    sig.normalize_s();
    let msg = Message::from_digest(*digest);
    SECP.verify_ecdsa(&msg, &sig, &pubkey).is_ok()
}

/// A secp256k1 key used to authorize spends.
#[derive(Clone)]
pub struct EcdsaKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl EcdsaKeyPair {
    pub fn generate() -> Self {
        let (secret, public) = SECP.generate_keypair(&mut secp256k1::rand::thread_rng());
        Self { secret, public }
    }

    /// Restore from 32 raw secret-key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| SignatureError::InvalidSecretKey)?;
        let public = PublicKey::from_secret_key(&SECP, &secret);
        Ok(Self { secret, public })
    }

    /// Compressed 33-byte public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.serialize().to_vec()
    }

    /// HASH160 of the compressed public key.
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.public.serialize())
    }

    /// DER-encoded signature over a 32-byte digest.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Vec<u8> {
        let msg = Message::from_digest(*digest);
        SECP.sign_ecdsa(&msg, &self.secret).serialize_der().to_vec()
    }

    /// Sign the sighash-all digest of `tx`.
    pub fn sign_transaction(&self, tx: &Vertex) -> Vec<u8> {
        self.sign_digest(&sighash_digest(tx))
    }
}

impl std::fmt::Debug for EcdsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EcdsaKeyPair {{ pubkey_hash: {} }}", hex::encode(self.pubkey_hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let key = EcdsaKeyPair::generate();
        let digest = sha256d(b"spend");
        let sig = key.sign_digest(&digest);
        assert!(verify_ecdsa(&key.public_key_bytes(), &sig, &digest));
    }

    #[test]
    fn wrong_digest_or_key_fails() {
        let key = EcdsaKeyPair::from_secret_bytes(&[7u8; 32]).unwrap();
        let other = EcdsaKeyPair::from_secret_bytes(&[8u8; 32]).unwrap();
        let digest = sha256d(b"spend");
        let sig = key.sign_digest(&digest);
        assert!(!verify_ecdsa(&key.public_key_bytes(), &sig, &sha256d(b"other")));
        assert!(!verify_ecdsa(&other.public_key_bytes(), &sig, &digest));
    }

    #[test]
    fn garbage_inputs_are_false_not_errors() {
        let digest = [0u8; 32];
        assert!(!verify_ecdsa(&[1, 2, 3], &[4, 5, 6], &digest));
        let key = EcdsaKeyPair::generate();
        assert!(!verify_ecdsa(&key.public_key_bytes(), &[0x30, 0x01], &digest));
    }

    #[test]
    fn shared_context_works_across_threads() {
        let handles: Vec<_> = (1u8..=4)
            .map(|n| {
                std::thread::spawn(move || {
                    let key = EcdsaKeyPair::from_secret_bytes(&[n; 32]).unwrap();
                    let digest = sha256d(&[n]);
                    let sig = key.sign_digest(&digest);
                    verify_ecdsa(&key.public_key_bytes(), &sig, &digest)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn zero_secret_is_rejected() {
        assert!(EcdsaKeyPair::from_secret_bytes(&[0u8; 32]).is_err());
    }
}
