use std::collections::BTreeSet;
use std::path::Path;

use braid_core::{BraidError, OutPoint, Vertex, VertexId, VertexKind};
use braid_dag::{AcceptRecord, VertexMeta, VertexStore};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};

/// Persistent vertex store backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   vertices    — VertexId bytes → bincode(Vertex)
///   meta        — VertexId bytes → bincode(VertexMeta)
///   block_tips  — VertexId bytes → [] (membership set)
///   tx_tips     — VertexId bytes → [] (membership set)
///   spent       — OutPoint key (36 bytes) → spender VertexId bytes
///
/// `put` writes all five trees in one sled transaction.
pub struct SledStore {
    db: sled::Db,
    vertices: sled::Tree,
    meta: sled::Tree,
    block_tips: sled::Tree,
    tx_tips: sled::Tree,
    spent: sled::Tree,
}

fn storage(e: sled::Error) -> BraidError {
    BraidError::Storage(e.to_string())
}

fn id_from_key(key: &[u8]) -> Result<VertexId, BraidError> {
    VertexId::from_slice(key)
        .ok_or_else(|| BraidError::Storage(format!("corrupt key of {} bytes", key.len())))
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BraidError> {
        let db = sled::open(path).map_err(storage)?;
        let vertices   = db.open_tree("vertices").map_err(storage)?;
        let meta       = db.open_tree("meta").map_err(storage)?;
        let block_tips = db.open_tree("block_tips").map_err(storage)?;
        let tx_tips    = db.open_tree("tx_tips").map_err(storage)?;
        let spent      = db.open_tree("spent").map_err(storage)?;
        Ok(Self { db, vertices, meta, block_tips, tx_tips, spent })
    }

    fn tip_tree(&self, kind: VertexKind) -> &sled::Tree {
        match kind {
            VertexKind::Block => &self.block_tips,
            VertexKind::Transaction => &self.tx_tips,
        }
    }
}

impl VertexStore for SledStore {
    fn get(&self, id: &VertexId) -> Result<Option<Vertex>, BraidError> {
        match self.vertices.get(id.as_bytes()).map_err(storage)? {
            Some(bytes) => {
                let v = bincode::deserialize(&bytes)
                    .map_err(|e| BraidError::Serialization(e.to_string()))?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    fn exists(&self, id: &VertexId) -> Result<bool, BraidError> {
        self.vertices.contains_key(id.as_bytes()).map_err(storage)
    }

    fn is_empty(&self) -> Result<bool, BraidError> {
        Ok(self.vertices.is_empty())
    }

    fn meta(&self, id: &VertexId) -> Result<Option<VertexMeta>, BraidError> {
        match self.meta.get(id.as_bytes()).map_err(storage)? {
            Some(bytes) => {
                let m = bincode::deserialize(&bytes)
                    .map_err(|e| BraidError::Serialization(e.to_string()))?;
                Ok(Some(m))
            }
            None => Ok(None),
        }
    }

    fn tips(&self, kind: VertexKind) -> Result<BTreeSet<VertexId>, BraidError> {
        let mut tips = BTreeSet::new();
        for item in self.tip_tree(kind).iter() {
            let (key, _) = item.map_err(storage)?;
            tips.insert(id_from_key(&key)?);
        }
        Ok(tips)
    }

    fn spender_of(&self, outpoint: &OutPoint) -> Result<Option<VertexId>, BraidError> {
        match self.spent.get(outpoint.to_key()).map_err(storage)? {
            Some(bytes) => Ok(Some(id_from_key(&bytes)?)),
            None => Ok(None),
        }
    }

    fn ids(&self, kind: VertexKind) -> Result<Vec<VertexId>, BraidError> {
        let mut ids = Vec::new();
        for item in self.vertices.iter() {
            let (key, bytes) = item.map_err(storage)?;
            let v: Vertex = bincode::deserialize(&bytes)
                .map_err(|e| BraidError::Serialization(e.to_string()))?;
            if v.kind == kind {
                ids.push(id_from_key(&key)?);
            }
        }
        Ok(ids)
    }

    fn put(&mut self, record: &AcceptRecord) -> Result<bool, BraidError> {
        let id = record.vertex.hash;
        let vertex_bytes = bincode::serialize(&record.vertex)
            .map_err(|e| BraidError::Serialization(e.to_string()))?;
        let meta_bytes = bincode::serialize(&record.meta)
            .map_err(|e| BraidError::Serialization(e.to_string()))?;
        let tip_kind = record.tips.kind;

        let result = (
            &self.vertices,
            &self.meta,
            &self.block_tips,
            &self.tx_tips,
            &self.spent,
        )
            .transaction(|(vertices, meta, block_tips, tx_tips, spent)| {
                if vertices.get(id.as_bytes())?.is_some() {
                    return Ok(false);
                }
                for outpoint in &record.spends {
                    if let Some(existing) = spent.get(outpoint.to_key())? {
                        let spender = VertexId::from_slice(&existing)
                            .map(|s| s.to_hex())
                            .unwrap_or_default();
                        return Err(ConflictableTransactionError::Abort(
                            BraidError::DoubleSpend {
                                outpoint: outpoint.to_string(),
                                spender,
                            },
                        ));
                    }
                }
                for outpoint in &record.spends {
                    spent.insert(&outpoint.to_key()[..], id.as_bytes())?;
                }
                let tips = match tip_kind {
                    VertexKind::Block => block_tips,
                    VertexKind::Transaction => tx_tips,
                };
                for removed in &record.tips.removed {
                    tips.remove(removed.as_bytes())?;
                }
                tips.insert(record.tips.added.as_bytes(), &[][..])?;
                meta.insert(id.as_bytes(), meta_bytes.as_slice())?;
                vertices.insert(id.as_bytes(), vertex_bytes.as_slice())?;
                Ok(true)
            });

        match result {
            Ok(written) => Ok(written),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(storage(e)),
        }
    }

    fn flush(&self) -> Result<(), BraidError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}
