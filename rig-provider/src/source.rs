//! Source documents read from the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bioforge_engine::error::SourceError;
use bioforge_engine::source::{SourceDocument, SourceProvider};

/// Reads source text from files.
///
/// A batch identifier is either `<path>` or `<source_url> <path>`. Without an
/// explicit URL the document's URL is `file://` plus the canonical path.
/// Relative paths resolve against the provider's base directory.
#[derive(Debug, Clone, Default)]
pub struct FileSourceProvider {
    base_dir: Option<PathBuf>,
}

impl FileSourceProvider {
    /// Creates a provider resolving relative paths against the working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative paths against `base_dir` (usually the batch list's directory).
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Splits an identifier into an optional URL and a path.
fn split_identifier(identifier: &str) -> (Option<&str>, &str) {
    let identifier = identifier.trim();
    match identifier.split_once(char::is_whitespace) {
        Some((url, path)) if url.contains("://") => (Some(url), path.trim()),
        _ => (None, identifier),
    }
}

#[async_trait]
impl SourceProvider for FileSourceProvider {
    async fn fetch(&self, identifier: &str) -> Result<SourceDocument, SourceError> {
        let (url, path) = split_identifier(identifier);
        let path = self.resolve(path);
        let unavailable = |e: std::io::Error| SourceError::Unavailable {
            identifier: identifier.to_string(),
            message: e.to_string(),
        };

        let text = tokio::fs::read_to_string(&path).await.map_err(unavailable)?;
        if text.trim().is_empty() {
            return Err(SourceError::Empty(identifier.to_string()));
        }

        let source_url = match url {
            Some(url) => url.to_string(),
            None => {
                let canonical = tokio::fs::canonicalize(&path).await.map_err(unavailable)?;
                format!("file://{}", canonical.display())
            }
        };
        tracing::debug!(
            event = "source_loaded",
            identifier,
            source_url = %source_url,
            chars = text.chars().count(),
            "Loaded source"
        );

        Ok(SourceDocument::new(source_url, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("data/a.txt"), (None, "data/a.txt"));
        assert_eq!(
            split_identifier("https://www.news.cn/a.html   data/a.txt"),
            (Some("https://www.news.cn/a.html"), "data/a.txt")
        );
        assert_eq!(split_identifier("my notes.txt"), (None, "my notes.txt"));
    }

    #[tokio::test]
    async fn test_fetch_with_and_without_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("obit.txt"), "林炳尧同志，1943年出生。").unwrap();
        let provider = FileSourceProvider::new().with_base_dir(dir.path());

        let doc = provider.fetch("https://www.news.cn/obit.html obit.txt").await.unwrap();
        assert_eq!(doc.source_url, "https://www.news.cn/obit.html");
        assert!(doc.text.contains("1943"));

        let doc = provider.fetch("obit.txt").await.unwrap();
        assert!(doc.source_url.starts_with("file://"));
        assert!(doc.source_url.ends_with("obit.txt"));
    }

    #[tokio::test]
    async fn test_missing_and_empty_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank.txt"), "  \n").unwrap();
        let provider = FileSourceProvider::new().with_base_dir(dir.path());

        assert!(matches!(
            provider.fetch("missing.txt").await,
            Err(SourceError::Unavailable { .. })
        ));
        assert!(matches!(provider.fetch("blank.txt").await, Err(SourceError::Empty(_))));
    }
}
