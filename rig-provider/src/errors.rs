use thiserror::Error;

/// Errors relating to the bioforge provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Engine construction error.
    #[error("Engine error: {0}")]
    Engine(#[from] bioforge_engine::error::EngineError),

    /// Record store error.
    #[error("Store error: {0}")]
    Store(#[from] bioforge_engine::error::StoreError),

    /// Source error.
    #[error("Source error: {0}")]
    Source(#[from] bioforge_engine::error::SourceError),

    /// Output file could not be written.
    #[error("Failed to write output {path}: {message}")]
    Output {
        /// Target path.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// Initialization error.
    #[error("Initialization error: {0}")]
    Init(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
