//! Source documents and the providers that fetch them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Decoded text of one source, with the URL it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// URL (or `file://` reference) recorded on the extracted record.
    pub source_url: String,
    /// Full source text.
    pub text: String,
}

impl SourceDocument {
    /// Creates a document.
    #[must_use]
    pub fn new(source_url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            text: text.into(),
        }
    }
}

/// Resolves a batch identifier (URL, path, ...) into source text.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetches and decodes the source named by `identifier`.
    async fn fetch(&self, identifier: &str) -> Result<SourceDocument, SourceError>;
}
