//! Full unlocking + locking script evaluation for the standard scripts.
//!
//! Run with:
//!   cargo test -p braid-script --test p2pkh

use braid_core::{OutPoint, ScriptError, TxInput, TxOutput, Vertex, VertexId};
use braid_crypto::EcdsaKeyPair;
use braid_script::{p2pkh, p2pkh_unlock, timelocked_p2pkh, verify_input, ScriptExtras};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn funding(script: Vec<u8>) -> Vertex {
    let mut v = Vertex::new_block(vec![], 0.0, 100, vec![TxOutput::new(1_000, script)]);
    v.hash = VertexId::from_bytes([0x42; 32]);
    v
}

fn spend(funding: &Vertex, timestamp: i64) -> Vertex {
    Vertex::new_transaction(
        vec![],
        1.0,
        timestamp,
        vec![TxInput::new(OutPoint::new(funding.hash, 0), vec![])],
        vec![TxOutput::new(1_000, vec![])],
    )
}

fn check(tx: &Vertex, funding: &Vertex, unlocking: &[u8]) -> Result<(), ScriptError> {
    let extras = ScriptExtras {
        tx,
        input_index: 0,
        spent_vertex: funding,
    };
    verify_input(unlocking, &funding.outputs[0].script, &extras)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn p2pkh_spend_by_owner_succeeds() {
    let key = EcdsaKeyPair::generate();
    let funding = funding(p2pkh(&key.pubkey_hash()));
    let tx = spend(&funding, 200);
    let unlock = p2pkh_unlock(&key.sign_transaction(&tx), &key.public_key_bytes()).unwrap();
    assert_eq!(check(&tx, &funding, &unlock), Ok(()));
}

#[test]
fn p2pkh_spend_with_wrong_key_fails_equalverify() {
    let owner = EcdsaKeyPair::generate();
    let thief = EcdsaKeyPair::generate();
    let funding = funding(p2pkh(&owner.pubkey_hash()));
    let tx = spend(&funding, 200);
    let unlock = p2pkh_unlock(&thief.sign_transaction(&tx), &thief.public_key_bytes()).unwrap();
    assert_eq!(check(&tx, &funding, &unlock), Err(ScriptError::EqualVerifyFailed));
}

#[test]
fn p2pkh_signature_over_other_outputs_is_invalid() {
    let key = EcdsaKeyPair::generate();
    let funding = funding(p2pkh(&key.pubkey_hash()));
    let tx = spend(&funding, 200);
    let mut redirected = tx.clone();
    redirected.outputs[0].value = 999;
    let unlock = p2pkh_unlock(&key.sign_transaction(&tx), &key.public_key_bytes()).unwrap();
    assert_eq!(
        check(&redirected, &funding, &unlock),
        Err(ScriptError::InvalidSignature)
    );
}

#[test]
fn timelocked_output_respects_lock() {
    let key = EcdsaKeyPair::generate();
    let funding = funding(timelocked_p2pkh(&key.pubkey_hash(), 500));

    for ts in [400, 500] {
        let tx = spend(&funding, ts);
        let unlock = p2pkh_unlock(&key.sign_transaction(&tx), &key.public_key_bytes()).unwrap();
        assert_eq!(
            check(&tx, &funding, &unlock),
            Err(ScriptError::TimeLocked {
                lock: 500,
                timestamp: ts
            })
        );
    }

    let tx = spend(&funding, 501);
    let unlock = p2pkh_unlock(&key.sign_transaction(&tx), &key.public_key_bytes()).unwrap();
    assert_eq!(check(&tx, &funding, &unlock), Ok(()));
}

#[test]
fn empty_unlocking_script_is_missing_items() {
    let key = EcdsaKeyPair::generate();
    let funding = funding(p2pkh(&key.pubkey_hash()));
    let tx = spend(&funding, 200);
    assert!(matches!(
        check(&tx, &funding, &[]),
        Err(ScriptError::MissingStackItems { opcode: "OP_DUP", .. })
    ));
}
