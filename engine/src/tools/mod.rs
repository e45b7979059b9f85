//! Typed tools the reasoning service can invoke, and the registry that runs them.

pub mod builtin;
pub mod registry;
pub mod toolkit;

use std::time::Duration;

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::evidence::{EvidenceContext, SourceRef};
use crate::validation::FieldError;

pub use builtin::{
    BiographyExampleTool, LookupExistingRecordTool, SubmitBiographyTool, ValidateBiographyTool,
    ValidateDatesTool, VerifyInformationTool,
};
pub use registry::{FnTool, ToolRegistry};
pub use toolkit::{BiographyToolkit, BiographyToolkitBuilder};

/// Classification of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No tool is registered under the requested name.
    UnknownTool,
    /// The input did not match the tool's input schema.
    InvalidInput,
    /// A candidate record failed schema or chronology checks.
    Validation,
    /// The executor ran and failed.
    Execution,
    /// The executor exceeded its deadline.
    Timeout,
    /// The executor panicked.
    Panicked,
    /// The call broke the conversation protocol (e.g. a second finalize).
    ProtocolViolation,
    /// The engine itself is misconfigured; the run cannot continue.
    Configuration,
}

impl ToolErrorKind {
    /// Stable snake-case label, used in logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidInput => "invalid_input",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Timeout => "timeout",
            Self::Panicked => "panicked",
            Self::ProtocolViolation => "protocol_violation",
            Self::Configuration => "configuration",
        }
    }
}

/// Error returned by a tool executor.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The input could not be interpreted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The submitted record is not acceptable.
    #[error("Validation failed with {} error(s)", errors.len())]
    Validation {
        /// Every problem found.
        errors: Vec<FieldError>,
        /// The submission as the tool saw it, echoed back for correction.
        submission: Value,
    },

    /// The executor failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The call is not allowed at this point of the conversation.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The engine is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ToolError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ToolErrorKind {
        match self {
            Self::InvalidInput(_) => ToolErrorKind::InvalidInput,
            Self::Validation { .. } => ToolErrorKind::Validation,
            Self::Execution(_) => ToolErrorKind::Execution,
            Self::ProtocolViolation(_) => ToolErrorKind::ProtocolViolation,
            Self::Configuration(_) => ToolErrorKind::Configuration,
        }
    }

    /// Structured details to attach to the failed result, if any.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation { errors, submission } => Some(json!({
                "errors": errors,
                "submission": submission,
            })),
            _ => None,
        }
    }
}

/// Per-run state a tool may consult.
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    /// Source texts registered for this run.
    pub evidence: &'a EvidenceContext,
    /// Reference of the source being extracted.
    pub source_ref: &'a SourceRef,
    /// URL of the source being extracted.
    pub source_url: &'a str,
}

/// A tool the reasoning service can call.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Name, description and JSON input schema declared to the service.
    fn definition(&self) -> ToolDefinition;

    /// Whether the registry checks input against the declared schema before
    /// calling [`Self::execute`]. Tools that sanitize loose input themselves
    /// opt out.
    fn validates_input(&self) -> bool {
        true
    }

    /// Runs the tool.
    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError>;
}

/// Deserializes tool input, mapping failures to [`ToolError::InvalidInput`].
///
/// # Errors
///
/// Returns [`ToolError::InvalidInput`] if `input` does not fit `T`.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Uniform envelope for the outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    /// Name the call was dispatched under.
    pub tool_name: String,
    /// Whether the executor returned successfully.
    pub success: bool,
    /// Executor output on success; structured error details on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    /// Wall time spent in dispatch.
    #[serde(skip)]
    pub duration: Duration,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn success(tool_name: impl Into<String>, data: Value, duration: Duration) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            duration,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(
        tool_name: impl Into<String>,
        kind: ToolErrorKind,
        error: impl Into<String>,
        details: Option<Value>,
        duration: Duration,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            data: details,
            error: Some(error.into()),
            error_kind: Some(kind),
            duration,
        }
    }

    /// A failed result built from an executor error.
    #[must_use]
    pub fn from_error(tool_name: impl Into<String>, error: &ToolError, duration: Duration) -> Self {
        Self::failure(tool_name, error.kind(), error.to_string(), error.details(), duration)
    }

    /// Rendering of the result for the tool-result turn.
    #[must_use]
    pub fn to_model_content(&self) -> String {
        if self.success {
            return self
                .data
                .as_ref()
                .map_or_else(|| "{}".to_string(), ToString::to_string);
        }
        let mut body = json!({
            "error": self.error,
            "kind": self.error_kind.map(ToolErrorKind::as_str),
        });
        if let Some(details) = &self.data {
            body["details"] = details.clone();
        }
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_details() {
        let error = ToolError::Validation {
            errors: vec![FieldError::new("birth_date", "bad")],
            submission: json!({"birth_date": "x"}),
        };
        assert_eq!(error.kind(), ToolErrorKind::Validation);
        assert_eq!(error.to_string(), "Validation failed with 1 error(s)");
        let details = error.details().unwrap();
        assert_eq!(details["errors"][0]["field"], "birth_date");
        assert_eq!(details["submission"]["birth_date"], "x");
    }

    #[test]
    fn test_model_content() {
        let ok = ToolResult::success("biography_example", json!({"name": "x"}), Duration::ZERO);
        assert_eq!(ok.to_model_content(), r#"{"name":"x"}"#);

        let failed = ToolResult::failure(
            "lookup_existing_record",
            ToolErrorKind::Timeout,
            "timed out",
            None,
            Duration::ZERO,
        );
        let body: Value = serde_json::from_str(&failed.to_model_content()).unwrap();
        assert_eq!(body["kind"], "timeout");
        assert_eq!(body["error"], "timed out");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_parse_input_maps_to_invalid_input() {
        #[derive(Debug, Deserialize)]
        struct Args {
            #[allow(dead_code)]
            name: String,
        }
        let error = parse_input::<Args>(json!({"name": 3})).unwrap_err();
        assert_eq!(error.kind(), ToolErrorKind::InvalidInput);
    }
}
