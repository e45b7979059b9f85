use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ToolInvocation;
use crate::metrics::TokenUsage;
use crate::record::Biography;
use crate::tools::{ToolErrorKind, ToolResult};

/// One tool call of a run. Appended to the trace and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Invocation identity assigned by the service.
    pub invocation_id: String,
    /// Requested tool name.
    pub tool_name: String,
    /// Input as sent by the model.
    pub input: Value,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    /// Result payload (output on success, details on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// Time spent dispatching.
    pub duration_ms: u64,
}

impl ToolCall {
    pub(crate) fn record(invocation: &ToolInvocation, result: &ToolResult) -> Self {
        Self {
            invocation_id: invocation.id.clone(),
            tool_name: invocation.name.clone(),
            input: invocation.input.clone(),
            success: result.success,
            error: result.error.clone(),
            error_kind: result.error_kind,
            result: result.data.clone(),
            timestamp: Utc::now(),
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Why a run ended without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The turn budget ran out before an accepted finalize.
    BudgetExceeded,
    /// The reasoning service failed after its retries.
    Transport,
    /// The engine was misconfigured (e.g. the run's evidence was unavailable).
    Configuration,
}

impl FailureKind {
    /// Stable snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExceeded => "budget_exceeded",
            Self::Transport => "transport",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Classification.
    pub kind: FailureKind,
    /// Detail message.
    pub message: String,
}

impl RunFailure {
    /// Creates a failure.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A record was accepted by the finalize tool.
    Completed {
        /// The accepted record.
        record: Biography,
    },
    /// The run ended without a record.
    Failed {
        /// Why.
        failure: RunFailure,
    },
}

/// Everything that survives a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Source URL the run extracted from.
    pub source_url: String,
    /// Terminal state.
    pub outcome: RunOutcome,
    /// Every tool call, in order.
    pub trace: Vec<ToolCall>,
    /// Model turns taken.
    pub turns: usize,
    /// Rejected finalize attempts before termination.
    pub finalize_rejections: usize,
    /// Service usage.
    pub usage: TokenUsage,
    /// Wall time of the run.
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl RunResult {
    /// Whether the run produced a record.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    /// The accepted record, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&Biography> {
        match &self.outcome {
            RunOutcome::Completed { record } => Some(record),
            RunOutcome::Failed { .. } => None,
        }
    }

    /// The failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&RunFailure> {
        match &self.outcome {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Failed { failure } => Some(failure),
        }
    }

    /// Calls to `tool` in the trace.
    pub fn calls_to<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a ToolCall> + 'a {
        self.trace.iter().filter(move |call| call.tool_name == tool)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
