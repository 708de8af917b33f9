//! Run history storage.
//!
//! Saving is an upsert keyed by run id: a record saved twice is stored once,
//! with the later save's fields, and keeps its original list position.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::RunRecord;

/// Trait for run history storage
///
/// Implementations must be thread-safe; the tracker and its callers share
/// one instance.
pub trait RunStore: Send + Sync {
    /// Insert the record, or replace the one with the same id
    fn save(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Look up a record by id
    fn get(&self, id: &Uuid) -> Result<Option<RunRecord>, StoreError>;

    /// All records in first-insertion order
    fn list(&self) -> Result<Vec<RunRecord>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: Vec<RunRecord>,
    index: HashMap<Uuid, usize>,
}

/// In-memory run store.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.index.get(&record.id).copied() {
            Some(pos) => inner.records[pos] = record.clone(),
            None => {
                let pos = inner.records.len();
                inner.records.push(record.clone());
                inner.index.insert(record.id, pos);
            }
        }
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<Option<RunRecord>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.index.get(id).map(|&pos| inner.records[pos].clone()))
    }

    fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.records.clone())
    }
}

/// Sled-based persistent run store
///
/// Records live in the `runs` tree as JSON keyed by id bytes. The `order`
/// tree maps a monotonically increasing sequence number to the id so that
/// listing follows first-insertion order.
pub struct SledRunStore {
    db: sled::Db,
    runs: sled::Tree,
    order: sled::Tree,
}

impl SledRunStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Backend(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Create a temporary store that is removed on drop
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Backend(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let runs = db.open_tree("runs")?;
        let order = db.open_tree("order")?;
        Ok(Self { db, runs, order })
    }
}

impl RunStore for SledRunStore {
    fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let key = &record.id.as_bytes()[..];
        let seq = self.db.generate_id()?.to_be_bytes();

        // Record and list position are written together or not at all
        let created = (&self.runs, &self.order)
            .transaction(|(runs, order)| {
                let previous = runs.insert(key, bytes.as_slice())?;
                // Only the save that created the key gets a list position
                if previous.is_none() {
                    order.insert(&seq[..], key)?;
                }
                Ok::<_, ConflictableTransactionError<StoreError>>(previous.is_none())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => StoreError::from(e),
            })?;
        if !created {
            debug!("Run {} replaced in store", record.id);
        }

        self.db
            .flush()
            .map_err(|e| StoreError::Backend(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<Option<RunRecord>, StoreError> {
        match self.runs.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in self.order.iter() {
            let (_, id_bytes) = entry?;
            if let Some(bytes) = self.runs.get(&id_bytes)? {
                records.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(records)
    }
}
