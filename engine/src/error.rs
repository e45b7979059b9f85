//! Error types shared across the engine.
//!
//! Run-level failures never surface as these errors: the conversation loop
//! folds them into [`RunResult`](crate::conversation::RunResult) values.
//! These types describe the failures of individual collaborators.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while assembling the engine (configuration, schema setup).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record schema failed to compile.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A configuration value is out of range.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// A tool with the same name is already registered.
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

/// Failures of the external reasoning service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The call did not complete within its deadline.
    #[error("Reasoning service timed out after {0:?}")]
    Timeout(Duration),

    /// The provider asked us to slow down.
    #[error("Reasoning service rate limited: {0}")]
    RateLimited(String),

    /// The provider could not be reached.
    #[error("Reasoning service connection failed: {0}")]
    Connection(String),

    /// The provider rejected the request (authentication, bad request, ...).
    #[error("Reasoning service API error: {0}")]
    Api(String),
}

impl ServiceError {
    /// Whether the transport layer should try the call again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Api(_))
    }
}

/// Misuse of the evidence context.
///
/// These are programming errors, distinct from a probe that simply finds
/// nothing in the source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvidenceError {
    /// The reference was never registered with this context.
    #[error("Source reference {0} was never registered")]
    Unregistered(String),

    /// The reference was registered but has already been released.
    #[error("Source reference {0} has already been released")]
    Released(String),

    /// The probe carried no search terms.
    #[error("At least one search term is required")]
    NoProbeTerms,
}

/// Failures of a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be read or written.
    #[error("Record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("Record store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("Record store error: {0}")]
    Backend(String),
}

/// Failures of a source-text provider.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be read.
    #[error("Failed to read source {identifier}: {message}")]
    Unavailable {
        /// The batch identifier that failed.
        identifier: String,
        /// What went wrong.
        message: String,
    },

    /// The source was read but holds no text.
    #[error("Source {0} is empty")]
    Empty(String),
}
