//! Tool-calling extraction engine for biographical records.
//!
//! A [`ConversationLoop`](conversation::ConversationLoop) drives a reasoning
//! service through a bounded exchange in which the service calls tools from a
//! [`ToolRegistry`](tools::ToolRegistry) (validation, evidence probes, lookup)
//! and ends by submitting a [`Biography`](record::Biography) through the
//! finalize tool. The [`ConfidenceRouter`](confidence::ConfidenceRouter) sends
//! each result to accepted output or review, and the
//! [`BatchCoordinator`](batch::BatchCoordinator) runs many sources under a
//! shared rate limit.

pub mod batch;
pub mod confidence;
pub mod config;
pub mod conversation;
pub mod date;
pub mod error;
pub mod evidence;
pub mod feedback;
pub mod few_shot;
pub mod metrics;
pub mod profile;
pub mod prompt;
pub mod record;
pub mod service;
pub mod source;
pub mod store;
pub mod tools;
pub mod validation;

/// Common types for driving extractions.
pub mod prelude {
    pub use crate::batch::{
        BatchCoordinator, BatchItemResult, BatchReport, BatchSummary, ItemOutcome,
        parse_batch_input, settle_run,
    };
    pub use crate::confidence::{ConfidenceRouter, ReviewReason, Route};
    pub use crate::config::{BatchConfig, EngineConfig, RetryPolicy};
    pub use crate::conversation::{
        ConversationLoop, ModelRequest, ModelResponse, ReasoningService, RunOutcome, RunResult,
        ToolInvocation, Turn,
    };
    pub use crate::error::{EngineError, ServiceError, SourceError, StoreError};
    pub use crate::evidence::{EvidenceContext, EvidenceVerifier, SourceRef};
    pub use crate::few_shot::{ExampleLibrary, ExampleSnapshot};
    pub use crate::record::{Biography, Promotion};
    pub use crate::service::RetryingService;
    pub use crate::source::{SourceDocument, SourceProvider};
    pub use crate::store::{MemoryRecordStore, PersistOutcome, RecordStore};
    pub use crate::tools::{BiographyToolkit, ToolRegistry, ToolResult};
    pub use crate::validation::ValidationEngine;
}
