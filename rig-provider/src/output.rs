//! JSON artifacts written for accepted and review items.

use std::path::{Path, PathBuf};

use bioforge_engine::batch::{BatchItemResult, BatchSummary, ItemOutcome};
use bioforge_engine::confidence::ReviewReason;
use chrono::Local;
use serde_json::{Value, json};

use crate::errors::ProviderError;

/// Subdirectory holding items that need a human.
pub const REVIEW_DIR: &str = "needs_review";

/// File name of the batch summary.
pub const SUMMARY_FILE: &str = "batch_summary.json";

/// Writes one JSON file per item, split into accepted output and review.
///
/// ```text
/// <root>/<name>_<timestamp>.json
/// <root>/needs_review/REVIEW_<name>_<timestamp>.json
/// <root>/batch_summary.json
/// ```
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    root: PathBuf,
}

impl OutputDirectory {
    /// Creates `root` and its review subdirectory.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(REVIEW_DIR)).await?;
        Ok(Self { root })
    }

    /// The output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the artifact for one batch item and returns its path.
    pub async fn write_item(&self, item: &BatchItemResult) -> Result<PathBuf, ProviderError> {
        let name = item
            .run
            .as_ref()
            .and_then(|run| run.record())
            .map_or("unknown", |record| record.name.as_str());
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        match &item.outcome {
            ItemOutcome::Accepted { persisted } => {
                let body = json!({
                    "identifier": item.identifier,
                    "persisted": persisted,
                    "result": item.run,
                });
                let stem = format!("{}_{timestamp}", file_safe(name));
                self.write_json(&self.root, &stem, &body).await
            }
            ItemOutcome::Review { reason } => {
                let body = review_body(item, reason);
                let stem = format!("REVIEW_{}_{timestamp}", file_safe(name));
                self.write_json(&self.root.join(REVIEW_DIR), &stem, &body).await
            }
        }
    }

    /// Writes the batch summary, replacing any earlier one.
    pub async fn write_summary(&self, summary: &BatchSummary) -> Result<PathBuf, ProviderError> {
        let path = self.root.join(SUMMARY_FILE);
        write_pretty(&path, &serde_json::to_value(summary)?).await?;
        Ok(path)
    }

    async fn write_json(
        &self,
        dir: &Path,
        stem: &str,
        body: &Value,
    ) -> Result<PathBuf, ProviderError> {
        let path = unique_path(dir, stem).await;
        write_pretty(&path, body).await?;
        tracing::debug!(event = "output_written", path = %path.display(), "Wrote item output");
        Ok(path)
    }
}

fn review_body(item: &BatchItemResult, reason: &ReviewReason) -> Value {
    json!({
        "identifier": item.identifier,
        "review_reason": reason.to_string(),
        "review_details": reason,
        "flagged_at": Local::now().to_rfc3339(),
        "result": item.run,
    })
}

async fn write_pretty(path: &Path, body: &Value) -> Result<(), ProviderError> {
    let content = serde_json::to_string_pretty(body)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ProviderError::Output {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// `<dir>/<stem>.json`, or `<stem>_2.json`, `<stem>_3.json`, ... if taken.
async fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let mut path = dir.join(format!("{stem}.json"));
    let mut n = 2;
    while tokio::fs::try_exists(&path).await.unwrap_or(false) {
        path = dir.join(format!("{stem}_{n}.json"));
        n += 1;
    }
    path
}

/// Replaces characters that are unsafe in file names.
fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || "/\\:*?\"<>|".contains(c) { '_' } else { c })
        .collect();
    if cleaned.is_empty() { "unknown".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_item(index: usize) -> BatchItemResult {
        BatchItemResult {
            index,
            identifier: format!("obituaries/{index}.txt"),
            outcome: ItemOutcome::Review {
                reason: ReviewReason::SourceUnavailable {
                    message: "not found".into(),
                },
            },
            run: None,
        }
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("林炳尧"), "林炳尧");
        assert_eq!(file_safe(" a/b c "), "a_b_c");
        assert_eq!(file_safe("  "), "unknown");
    }

    #[tokio::test]
    async fn test_review_items_do_not_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDirectory::create(dir.path().join("out")).await.unwrap();

        let first = out.write_item(&review_item(0)).await.unwrap();
        let second = out.write_item(&review_item(1)).await.unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with(out.root().join(REVIEW_DIR)));
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("REVIEW_unknown_"));

        let body: Value = serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(body["review_reason"], "source unavailable");
        assert_eq!(body["review_details"]["reason"], "source_unavailable");
    }

    #[tokio::test]
    async fn test_summary_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDirectory::create(dir.path()).await.unwrap();
        let summary = BatchSummary {
            total: 2,
            accepted: 1,
            review: 1,
            ..BatchSummary::default()
        };

        let path = out.write_summary(&summary).await.unwrap();
        assert_eq!(path, dir.path().join(SUMMARY_FILE));
        let body: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(body["accepted"], 1);
    }
}
