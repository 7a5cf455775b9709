use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tsq_common::internal;

use crate::{Record, RecordId, StorageError, StorageService};

/// In-memory storage backend
///
/// Records are kept in a `Vec` behind an `RwLock`; a record's identifier is
/// its 1-based position, so identifiers are contiguous from 1. Clones share
/// the same records.
///
/// Nothing survives the process, and [`deactivate`](StorageService::deactivate)
/// empties the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<Record>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current number of records in the store
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageService for InMemoryStore {
    fn name(&self) -> &'static str {
        "InMemoryStore"
    }

    async fn get(&self, id: RecordId) -> crate::Result<Record> {
        let records = self.records.read()?;

        id.index()
            .and_then(|index| records.get(index))
            .cloned()
            .ok_or(StorageError::OutOfRange {
                id,
                len: records.len(),
            })
    }

    async fn put(&self, record: &str) -> crate::Result<RecordId> {
        let mut records = self.records.write()?;
        records.push(record.to_string());

        RecordId::from_len(records.len())
            .ok_or_else(|| StorageError::Internal("In-memory store is full".to_string()))
    }

    async fn activate(&self) -> crate::Result<()> {
        internal!(level = INFO, "Starting in-memory storage");
        Ok(())
    }

    async fn deactivate(&self) -> crate::Result<()> {
        internal!(level = INFO, "Stopping in-memory storage");
        self.records.write()?.clear();
        Ok(())
    }
}
