#![deny(missing_docs)]
//! Runtime pieces around the bioforge extraction engine.
//!
//! Provides the Rig-backed reasoning service, file sources, the JSON Lines
//! record store and the output directory used by the `bioforge` binary.

/// Command-line and environment configuration.
pub mod config;
/// Error types for the provider.
pub mod errors;
/// Output artifacts for accepted and review items.
pub mod output;
/// Reasoning service over Rig completion models.
pub mod reasoning;
/// File-based source provider.
pub mod source;
/// JSON Lines record store.
pub mod store;

pub use errors::ProviderError;
pub use output::OutputDirectory;
pub use reasoning::RigReasoningService;
pub use source::FileSourceProvider;
pub use store::JsonlRecordStore;
