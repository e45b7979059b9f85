//! Accepted records reused as examples for later runs.
//!
//! The library is process-wide and fills as a batch accepts records, holding
//! at most [`DEFAULT_LIBRARY_CAPACITY`] of the most recent ones. A run
//! never reads the library directly: it takes one [`ExampleSnapshot`] at
//! start, so the examples it sees cannot change mid-run.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::record::Biography;

/// Confidence a record needs to become an example.
pub const MIN_EXAMPLE_CONFIDENCE: f64 = 0.8;

/// Records held by a library unless configured otherwise.
pub const DEFAULT_LIBRARY_CAPACITY: usize = 50;

/// Shared set of the most recent confident records.
#[derive(Debug)]
pub struct ExampleLibrary {
    records: RwLock<VecDeque<Biography>>,
    capacity: usize,
}

impl Default for ExampleLibrary {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LIBRARY_CAPACITY)
    }
}

impl ExampleLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty library holding at most `capacity` records (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Creates a library seeded with `records`, keeping only confident ones.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Biography>) -> Self {
        let mut library = Self::new();
        let capacity = library.capacity;
        let held = library.records.get_mut();
        for record in records {
            if record.confidence >= MIN_EXAMPLE_CONFIDENCE {
                push_bounded(held, record, capacity);
            }
        }
        library
    }

    /// Adds `record` if it is confident enough, evicting the oldest record
    /// when full. Returns whether it was kept.
    pub async fn add(&self, record: &Biography) -> bool {
        if record.confidence < MIN_EXAMPLE_CONFIDENCE {
            return false;
        }
        let mut records = self.records.write().await;
        push_bounded(&mut records, record.clone(), self.capacity);
        true
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the library is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Selects up to `n` examples: highest confidence first, one per name
    /// while distinct names remain.
    pub async fn snapshot(&self, n: usize) -> ExampleSnapshot {
        if n == 0 {
            return ExampleSnapshot::empty();
        }
        let records = self.records.read().await;

        let mut ranked: Vec<&Biography> = records.iter().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut used_names = HashSet::new();
        let mut selected: Vec<usize> = Vec::with_capacity(n);
        for (index, record) in ranked.iter().enumerate() {
            if selected.len() == n {
                break;
            }
            if used_names.insert(record.name.as_str()) {
                selected.push(index);
            }
        }
        for index in 0..ranked.len() {
            if selected.len() == n {
                break;
            }
            if !selected.contains(&index) {
                selected.push(index);
            }
        }

        ExampleSnapshot {
            examples: selected.into_iter().map(|i| ranked[i].clone()).collect(),
        }
    }
}

fn push_bounded(records: &mut VecDeque<Biography>, record: Biography, capacity: usize) {
    while records.len() >= capacity {
        records.pop_front();
    }
    records.push_back(record);
}

/// Immutable example set handed to one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExampleSnapshot {
    examples: Arc<[Biography]>,
}

impl ExampleSnapshot {
    /// A snapshot without examples.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The selected examples.
    #[must_use]
    pub fn examples(&self) -> &[Biography] {
        &self.examples
    }

    /// Whether the snapshot holds no examples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, confidence: f64) -> Biography {
        Biography {
            confidence,
            ..Biography::new(name, format!("https://www.news.cn/{name}.html"))
        }
    }

    #[tokio::test]
    async fn test_only_confident_records_are_kept() {
        let library = ExampleLibrary::new();
        assert!(library.add(&record("甲", 0.85)).await);
        assert!(!library.add(&record("乙", 0.6)).await);
        assert_eq!(library.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_prefers_distinct_names_and_high_confidence() {
        let library = ExampleLibrary::with_records([
            record("甲", 0.95),
            record("甲", 0.93),
            record("乙", 0.82),
            record("丙", 0.91),
        ]);
        let snapshot = library.snapshot(3).await;
        let names: Vec<&str> = snapshot.examples().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["甲", "丙", "乙"]);
    }

    #[tokio::test]
    async fn test_snapshot_fills_with_repeated_names() {
        let library = ExampleLibrary::with_records([record("甲", 0.95), record("甲", 0.9)]);
        assert_eq!(library.snapshot(2).await.examples().len(), 2);
    }

    #[tokio::test]
    async fn test_library_keeps_most_recent_records() {
        let library = ExampleLibrary::with_capacity(2);
        for (name, confidence) in [("甲", 0.99), ("乙", 0.85), ("丙", 0.9)] {
            library.add(&record(name, confidence)).await;
        }
        assert_eq!(library.len().await, 2);
        let snapshot = library.snapshot(5).await;
        let names: Vec<&str> = snapshot.examples().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["丙", "乙"]);

        let seeded =
            ExampleLibrary::with_records((0..60).map(|i| record(&format!("员{i}"), 0.9)));
        assert_eq!(seeded.len().await, DEFAULT_LIBRARY_CAPACITY);
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_additions() {
        let library = ExampleLibrary::new();
        library.add(&record("甲", 0.9)).await;
        let snapshot = library.snapshot(2).await;
        library.add(&record("乙", 0.9)).await;
        assert_eq!(snapshot.examples().len(), 1);
        assert!(library.snapshot(0).await.is_empty());
    }
}
