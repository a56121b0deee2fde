use braid_core::PeerId;
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::dilithium::{self, SignatureError};
use crate::hash::peer_id_from_pubkey;

/// A node's network identity: Dilithium2 keys with the derived PeerId.
///
/// The secret key is wiped on drop.
pub struct PeerKeyPair {
    pub peer_id: PeerId,
    pub public_key: Vec<u8>,
    secret_key: Zeroizing<Vec<u8>>,
}

/// On-disk JSON form of a [`PeerKeyPair`].
#[derive(Serialize, Deserialize)]
pub struct PeerIdentityFile {
    pub peer_id: String,
    pub public_key: String,
    pub secret_key: String,
}

impl PeerKeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        Self::from_raw(pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
    }

    /// Restore a keypair from raw bytes.
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        Self {
            peer_id: peer_id_from_pubkey(&pk_bytes),
            public_key: pk_bytes,
            secret_key: Zeroizing::new(sk_bytes),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        dilithium::sign(&self.secret_key, message)
    }

    /// Proof sent in PEER-ID: a signature over the remote challenge followed
    /// by our own peer id.
    pub fn sign_challenge(&self, challenge: &[u8; 32]) -> Result<Vec<u8>, SignatureError> {
        self.sign(&challenge_message(challenge, &self.peer_id))
    }

    pub fn to_file(&self) -> PeerIdentityFile {
        PeerIdentityFile {
            peer_id: self.peer_id.to_b58(),
            public_key: hex::encode(&self.public_key),
            secret_key: hex::encode(self.secret_key.as_slice()),
        }
    }

    pub fn from_file(file: &PeerIdentityFile) -> Result<Self, SignatureError> {
        let pk = hex::decode(&file.public_key).map_err(|_| SignatureError::InvalidPublicKeyLength {
            expected: dilithium2::public_key_bytes(),
            got: 0,
        })?;
        let sk = hex::decode(&file.secret_key).map_err(|_| SignatureError::InvalidSecretKey)?;
        if pk.len() != dilithium2::public_key_bytes() {
            return Err(SignatureError::InvalidPublicKeyLength {
                expected: dilithium2::public_key_bytes(),
                got: pk.len(),
            });
        }
        if sk.len() != dilithium2::secret_key_bytes() {
            return Err(SignatureError::InvalidSecretKey);
        }
        let pair = Self::from_raw(pk, sk);
        if pair.peer_id.to_b58() != file.peer_id {
            return Err(SignatureError::IdentityMismatch);
        }
        Ok(pair)
    }
}

impl std::fmt::Debug for PeerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerKeyPair {{ peer_id: {:?} }}", self.peer_id)
    }
}

/// Fresh random challenge for a HELLO message.
pub fn random_challenge() -> [u8; 32] {
    rand::random()
}

fn challenge_message(challenge: &[u8; 32], peer_id: &PeerId) -> Vec<u8> {
    let mut msg = Vec::with_capacity(64);
    msg.extend_from_slice(challenge);
    msg.extend_from_slice(peer_id.as_bytes());
    msg
}

/// Check a PEER-ID proof: the key must hash to the claimed id and the
/// signature must cover `challenge || peer_id`.
pub fn verify_peer_proof(
    peer_id: &PeerId,
    public_key: &[u8],
    challenge: &[u8; 32],
    signature: &[u8],
) -> Result<(), SignatureError> {
    if peer_id_from_pubkey(public_key) != *peer_id {
        return Err(SignatureError::IdentityMismatch);
    }
    dilithium::verify_signature(public_key, &challenge_message(challenge, peer_id), signature)
}
