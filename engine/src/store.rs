//! Persistence sink for accepted records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::record::Biography;

/// A record already held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned identifier.
    pub id: String,
    /// The stored record.
    pub record: Biography,
}

/// Result of [`RecordStore::persist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "id", rename_all = "snake_case")]
pub enum PersistOutcome {
    /// The record was stored under a new identifier.
    Stored(String),
    /// A record with the same name and source URL already exists.
    Duplicate(String),
}

/// Storage of accepted records.
///
/// Duplicates are keyed by `(name, source_url)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records whose name equals `name`.
    async fn lookup(&self, name: &str) -> Result<Vec<StoredRecord>, StoreError>;

    /// Stores `record` unless an equivalent one is already present.
    async fn persist(&self, record: &Biography) -> Result<PersistOutcome, StoreError>;
}

/// In-process store, used when no persistent store is configured.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn lookup(&self, name: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|stored| stored.record.name == name)
            .cloned()
            .collect())
    }

    async fn persist(&self, record: &Biography) -> Result<PersistOutcome, StoreError> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.iter().find(|stored| {
            stored.record.name == record.name && stored.record.source_url == record.source_url
        }) {
            return Ok(PersistOutcome::Duplicate(existing.id.clone()));
        }
        let id = format!("rec_{}", records.len() + 1);
        records.push(StoredRecord {
            id: id.clone(),
            record: record.clone(),
        });
        Ok(PersistOutcome::Stored(id))
    }
}
