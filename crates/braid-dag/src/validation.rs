use std::collections::HashSet;

use braid_core::constants::{
    MAX_BLOCK_DATA, MAX_BLOCK_PARENTS, MAX_INPUTS, MAX_OUTPUTS, MAX_SCRIPT_SIZE,
    MIN_BLOCK_PARENTS, TX_PARENTS,
};
use braid_core::{BraidError, Timestamp, Value, Vertex, VertexId, VertexKind};
use braid_crypto::compute_vertex_id;

/// Network-dependent bounds applied by the structural checks.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationRules {
    pub min_block_weight: f64,
    pub min_tx_weight: f64,
    /// Upper bound on the outputs a block may create.
    pub block_reward: Value,
    /// How far ahead of the local clock a timestamp may be (seconds).
    pub max_future_drift: i64,
}

/// What the parent checks need to know about an accepted parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParentView {
    pub kind: VertexKind,
    pub timestamp: Timestamp,
}

/// Context-free checks on a candidate vertex.
///
/// Checks (in order):
/// 1. Id integrity (recomputed from body and nonce)
/// 2. Parent list shape (non-empty, distinct, plausible count)
/// 3. Kind-specific shape: inputs, outputs, aux data
/// 4. Output values and script sizes
/// 5. Block reward ceiling / transaction self-double-spend
/// 6. Minimum weight
/// 7. Timestamp not too far in the future
///
/// Note: parent existence lives in `validate_parents`; scripts, conservation
/// and cross-vertex double spends need the store and run in the engine.
pub fn validate_structure(
    vertex: &Vertex,
    rules: &ValidationRules,
    now: Timestamp,
) -> Result<(), BraidError> {
    // ── 1. Id integrity ──────────────────────────────────────────────────────
    let computed = compute_vertex_id(vertex);
    if computed != vertex.hash {
        return Err(BraidError::HashMismatch {
            declared: vertex.hash.to_hex(),
            computed: computed.to_hex(),
        });
    }

    // ── 2. Parent list ───────────────────────────────────────────────────────
    if vertex.parents.is_empty() {
        return Err(BraidError::InvalidParents(
            "only genesis vertices may be parentless".into(),
        ));
    }
    let distinct: HashSet<&VertexId> = vertex.parents.iter().collect();
    if distinct.len() != vertex.parents.len() {
        return Err(BraidError::InvalidParents("duplicate parent".into()));
    }
    let (min_parents, max_parents) = match vertex.kind {
        VertexKind::Block => (MIN_BLOCK_PARENTS + TX_PARENTS, MAX_BLOCK_PARENTS + TX_PARENTS),
        VertexKind::Transaction => (TX_PARENTS, TX_PARENTS),
    };
    if vertex.parents.len() < min_parents || vertex.parents.len() > max_parents {
        return Err(BraidError::InvalidParents(format!(
            "{} needs {}..={} parents, got {}",
            vertex.kind,
            min_parents,
            max_parents,
            vertex.parents.len()
        )));
    }

    // ── 3. Kind-specific shape ───────────────────────────────────────────────
    match vertex.kind {
        VertexKind::Block => {
            if !vertex.inputs.is_empty() {
                return Err(BraidError::Malformed("block with inputs".into()));
            }
            if vertex.data.len() > MAX_BLOCK_DATA {
                return Err(BraidError::Malformed(format!(
                    "block data {} bytes exceeds {}",
                    vertex.data.len(),
                    MAX_BLOCK_DATA
                )));
            }
        }
        VertexKind::Transaction => {
            if vertex.inputs.is_empty() {
                return Err(BraidError::Malformed("transaction without inputs".into()));
            }
            if !vertex.data.is_empty() {
                return Err(BraidError::Malformed("transaction with block data".into()));
            }
        }
    }
    if vertex.outputs.is_empty() {
        return Err(BraidError::Malformed("no outputs".into()));
    }
    if vertex.inputs.len() > MAX_INPUTS {
        return Err(BraidError::Malformed(format!(
            "{} inputs exceeds {}",
            vertex.inputs.len(),
            MAX_INPUTS
        )));
    }
    if vertex.outputs.len() > MAX_OUTPUTS {
        return Err(BraidError::Malformed(format!(
            "{} outputs exceeds {}",
            vertex.outputs.len(),
            MAX_OUTPUTS
        )));
    }

    // ── 4. Outputs and scripts ───────────────────────────────────────────────
    for (i, output) in vertex.outputs.iter().enumerate() {
        if output.value == 0 {
            return Err(BraidError::Malformed(format!("output {i} has zero value")));
        }
        if output.script.len() > MAX_SCRIPT_SIZE {
            return Err(BraidError::Malformed(format!(
                "output {i} script exceeds {MAX_SCRIPT_SIZE} bytes"
            )));
        }
    }
    for (i, input) in vertex.inputs.iter().enumerate() {
        if input.data.len() > MAX_SCRIPT_SIZE {
            return Err(BraidError::Malformed(format!(
                "input {i} script exceeds {MAX_SCRIPT_SIZE} bytes"
            )));
        }
    }

    // ── 5. Value rules ───────────────────────────────────────────────────────
    let total = vertex
        .output_total()
        .ok_or_else(|| BraidError::Malformed("output total overflows".into()))?;
    match vertex.kind {
        VertexKind::Block => {
            if total > rules.block_reward {
                return Err(BraidError::RewardExceeded {
                    outputs: total,
                    reward: rules.block_reward,
                });
            }
        }
        VertexKind::Transaction => {
            let mut seen = HashSet::new();
            for outpoint in vertex.spent_outpoints() {
                if !seen.insert(*outpoint) {
                    return Err(BraidError::DoubleSpend {
                        outpoint: outpoint.to_string(),
                        spender: vertex.hash.to_hex(),
                    });
                }
            }
        }
    }

    // ── 6. Weight ────────────────────────────────────────────────────────────
    let min = match vertex.kind {
        VertexKind::Block => rules.min_block_weight,
        VertexKind::Transaction => rules.min_tx_weight,
    };
    if !vertex.weight.is_finite() || vertex.weight < min {
        return Err(BraidError::WeightTooLow {
            min,
            got: vertex.weight,
        });
    }

    // ── 7. Future drift ──────────────────────────────────────────────────────
    if vertex.timestamp > now.saturating_add(rules.max_future_drift) {
        return Err(BraidError::TimestampInFuture {
            timestamp: vertex.timestamp,
            now,
        });
    }

    Ok(())
}

/// Check a vertex's parents against accepted vertices.
///
/// `lookup` returns `None` for a parent that is not accepted locally, which
/// fails with the recoverable `UnknownParent`.
pub fn validate_parents<F>(vertex: &Vertex, mut lookup: F) -> Result<(), BraidError>
where
    F: FnMut(&VertexId) -> Result<Option<ParentView>, BraidError>,
{
    let mut block_parents = 0usize;
    let mut tx_parents = 0usize;

    for parent in &vertex.parents {
        let view = lookup(parent)?.ok_or_else(|| BraidError::UnknownParent(parent.to_hex()))?;
        match view.kind {
            VertexKind::Block => block_parents += 1,
            VertexKind::Transaction => tx_parents += 1,
        }
        if vertex.timestamp < view.timestamp {
            return Err(BraidError::TimestampBeforeParent {
                timestamp: vertex.timestamp,
                parent: parent.to_hex(),
                parent_timestamp: view.timestamp,
            });
        }
    }

    if tx_parents != TX_PARENTS {
        return Err(BraidError::InvalidParents(format!(
            "{} needs exactly {} transaction parents, got {}",
            vertex.kind, TX_PARENTS, tx_parents
        )));
    }
    let block_range = match vertex.kind {
        VertexKind::Block => MIN_BLOCK_PARENTS..=MAX_BLOCK_PARENTS,
        VertexKind::Transaction => 0..=0,
    };
    if !block_range.contains(&block_parents) {
        return Err(BraidError::InvalidParents(format!(
            "{} has {} block parents",
            vertex.kind, block_parents
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{OutPoint, TxInput, TxOutput};
    use std::collections::HashMap;

    const NOW: Timestamp = 1_700_000_000;

    fn rules() -> ValidationRules {
        ValidationRules {
            min_block_weight: 2.0,
            min_tx_weight: 1.0,
            block_reward: 100,
            max_future_drift: 60,
        }
    }

    fn id(b: u8) -> VertexId {
        VertexId::from_bytes([b; 32])
    }

    fn sealed(mut v: Vertex) -> Vertex {
        v.hash = compute_vertex_id(&v);
        v
    }

    fn make_tx(parents: Vec<VertexId>) -> Vertex {
        sealed(Vertex::new_transaction(
            parents,
            1.0,
            NOW,
            vec![TxInput::new(OutPoint::new(id(9), 0), vec![1, 1])],
            vec![TxOutput::new(10, vec![0x76])],
        ))
    }

    fn make_block(parents: Vec<VertexId>, reward: u64) -> Vertex {
        sealed(Vertex::new_block(
            parents,
            2.0,
            NOW,
            vec![TxOutput::new(reward, vec![0x76])],
        ))
    }

    #[test]
    fn valid_transaction_passes() {
        assert!(validate_structure(&make_tx(vec![id(1), id(2)]), &rules(), NOW).is_ok());
    }

    #[test]
    fn tampered_hash_fails() {
        let mut tx = make_tx(vec![id(1), id(2)]);
        tx.outputs[0].value = 11;
        assert!(matches!(
            validate_structure(&tx, &rules(), NOW),
            Err(BraidError::HashMismatch { .. })
        ));
    }

    #[test]
    fn parent_shape_is_enforced() {
        for parents in [vec![], vec![id(1)], vec![id(1), id(1)], vec![id(1), id(2), id(3)]] {
            assert!(matches!(
                validate_structure(&make_tx(parents), &rules(), NOW),
                Err(BraidError::InvalidParents(_))
            ));
        }
        assert!(validate_structure(&make_block(vec![id(1), id(2), id(3)], 50), &rules(), NOW).is_ok());
        assert!(matches!(
            validate_structure(&make_block(vec![id(1), id(2)], 50), &rules(), NOW),
            Err(BraidError::InvalidParents(_))
        ));
    }

    #[test]
    fn block_reward_ceiling() {
        let block = make_block(vec![id(1), id(2), id(3)], 101);
        assert!(matches!(
            validate_structure(&block, &rules(), NOW),
            Err(BraidError::RewardExceeded { outputs: 101, reward: 100 })
        ));
    }

    #[test]
    fn duplicate_input_is_self_double_spend() {
        let mut tx = make_tx(vec![id(1), id(2)]);
        tx.inputs.push(tx.inputs[0].clone());
        let tx = sealed(tx);
        assert!(matches!(
            validate_structure(&tx, &rules(), NOW),
            Err(BraidError::DoubleSpend { .. })
        ));
    }

    #[test]
    fn zero_value_and_low_weight_fail() {
        let mut tx = make_tx(vec![id(1), id(2)]);
        tx.outputs[0].value = 0;
        assert!(matches!(
            validate_structure(&sealed(tx), &rules(), NOW),
            Err(BraidError::Malformed(_))
        ));

        let mut tx = make_tx(vec![id(1), id(2)]);
        tx.weight = 0.5;
        assert!(matches!(
            validate_structure(&sealed(tx), &rules(), NOW),
            Err(BraidError::WeightTooLow { .. })
        ));
    }

    #[test]
    fn future_timestamp_fails() {
        let mut tx = make_tx(vec![id(1), id(2)]);
        tx.timestamp = NOW + 61;
        assert!(matches!(
            validate_structure(&sealed(tx), &rules(), NOW),
            Err(BraidError::TimestampInFuture { .. })
        ));
    }

    #[test]
    fn parents_must_exist_with_right_kinds_and_times() {
        let mut known = HashMap::new();
        known.insert(id(1), ParentView { kind: VertexKind::Transaction, timestamp: NOW - 5 });
        known.insert(id(2), ParentView { kind: VertexKind::Transaction, timestamp: NOW });
        known.insert(id(3), ParentView { kind: VertexKind::Block, timestamp: NOW });
        known.insert(id(4), ParentView { kind: VertexKind::Transaction, timestamp: NOW + 1 });
        let lookup =
            |p: &VertexId| -> Result<Option<ParentView>, BraidError> { Ok(known.get(p).copied()) };

        assert!(validate_parents(&make_tx(vec![id(1), id(2)]), lookup).is_ok());
        assert!(validate_parents(&make_block(vec![id(3), id(1), id(2)], 1), lookup).is_ok());
        assert!(matches!(
            validate_parents(&make_tx(vec![id(1), id(7)]), lookup),
            Err(BraidError::UnknownParent(_))
        ));
        assert!(matches!(
            validate_parents(&make_tx(vec![id(1), id(3)]), lookup),
            Err(BraidError::InvalidParents(_))
        ));
        assert!(matches!(
            validate_parents(&make_tx(vec![id(1), id(4)]), lookup),
            Err(BraidError::TimestampBeforeParent { .. })
        ));
    }
}
