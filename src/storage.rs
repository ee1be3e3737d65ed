use std::path::Path;

use sled::{Db, Tree};
use thiserror::Error;

use crate::ledger::LedgerSnapshot;

const SNAPSHOT_KEY: &str = "snapshot:current";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
}

/// Persistence for ledger snapshots, owned by the harness driving the ledger.
pub trait Storage: Send + Sync {
    fn put_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError>;
    fn get_snapshot(&self) -> Result<Option<LedgerSnapshot>, StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

pub struct SledStorage {
    db: Db,
    ledger_tree: Tree,
}

impl SledStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            ledger_tree: db.open_tree("ledger")?,
            db,
        })
    }
}

impl Storage for SledStorage {
    fn put_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let encoded = bincode::serialize(snapshot)?;
        self.ledger_tree.insert(SNAPSHOT_KEY, encoded)?;
        self.db.flush()?;
        Ok(())
    }

    fn get_snapshot(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        let encoded = self.ledger_tree.get(SNAPSHOT_KEY)?;
        Ok(encoded.map(|e| bincode::deserialize(&e)).transpose()?)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.ledger_tree.remove(SNAPSHOT_KEY)?;
        self.db.flush()?;
        Ok(())
    }
}
