//! Append-only JSON Lines record store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bioforge_engine::error::StoreError;
use bioforge_engine::record::Biography;
use bioforge_engine::store::{PersistOutcome, RecordStore, StoredRecord};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Stores accepted records as one JSON object per line.
///
/// The file is read once at open; later writes append to it and to the
/// in-memory index, so lookups never touch the disk.
#[derive(Debug)]
pub struct JsonlRecordStore {
    path: PathBuf,
    records: Mutex<Vec<StoredRecord>>,
}

impl JsonlRecordStore {
    /// Opens (or prepares to create) the store at `path`.
    ///
    /// An unterminated last line that does not parse is left over from an
    /// interrupted append; it is cut off the file with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read, or if any complete
    /// line is not a stored record.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let (records, torn_at) = parse_records(&content)?;
                if let Some(offset) = torn_at {
                    tracing::warn!(
                        event = "store_truncated",
                        path = %path.display(),
                        dropped_bytes = content.len() - offset,
                        "Dropped incomplete last line of record store"
                    );
                    let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
                    file.set_len(offset as u64).await?;
                }
                records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            event = "store_opened",
            path = %path.display(),
            records = records.len(),
            "Opened record store"
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses every line of the store file, returning the byte offset of a torn
/// last line if there is one.
fn parse_records(content: &str) -> Result<(Vec<StoredRecord>, Option<usize>), StoreError> {
    let mut records = Vec::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(line.trim_end()) {
            Ok(stored) => records.push(stored),
            Err(_) if !line.ends_with('\n') => return Ok((records, Some(start))),
            Err(e) => return Err(e.into()),
        }
    }
    Ok((records, None))
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
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

        let stored = StoredRecord {
            id: format!("rec_{}", records.len() + 1),
            record: record.clone(),
        };
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let id = stored.id.clone();
        records.push(stored);
        Ok(PersistOutcome::Stored(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let store = JsonlRecordStore::open(&path).await.unwrap();
        let record = Biography::example();
        assert_eq!(
            store.persist(&record).await.unwrap(),
            PersistOutcome::Stored("rec_1".into())
        );
        drop(store);

        let reopened = JsonlRecordStore::open(&path).await.unwrap();
        assert_eq!(reopened.lookup("林炳尧").await.unwrap().len(), 1);
        assert_eq!(
            reopened.persist(&record).await.unwrap(),
            PersistOutcome::Duplicate("rec_1".into())
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(matches!(
            JsonlRecordStore::open(&path).await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_interrupted_append_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let first = StoredRecord {
            id: "rec_1".into(),
            record: Biography::example(),
        };
        let complete = format!("{}\n", serde_json::to_string(&first).unwrap());
        std::fs::write(&path, format!("{complete}{{\"id\":\"rec_2\",\"rec")).unwrap();

        let store = JsonlRecordStore::open(&path).await.unwrap();
        assert_eq!(store.lookup("林炳尧").await.unwrap(), vec![first]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), complete);

        let other = Biography::new("张国华", "https://www.news.cn/b.html");
        assert_eq!(
            store.persist(&other).await.unwrap(),
            PersistOutcome::Stored("rec_2".into())
        );
        drop(store);
        let reopened = JsonlRecordStore::open(&path).await.unwrap();
        assert_eq!(reopened.lookup("张国华").await.unwrap().len(), 1);
    }
}
