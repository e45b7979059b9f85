//! The bounded multi-turn exchange with the reasoning service.
//!
//! A run owns its history, trace and evidence context. The service is only
//! reachable through [`ReasoningService`], so the loop can be driven by a
//! scripted fake in tests.

mod driver;
mod trace;

use std::sync::Arc;

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::metrics::TokenUsage;

pub use driver::ConversationLoop;
pub use trace::{FailureKind, RunFailure, RunOutcome, RunResult, ToolCall};

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Identity the tool result must be keyed by.
    pub id: String,
    /// Requested tool name.
    pub name: String,
    /// Tool input.
    pub input: Value,
}

impl ToolInvocation {
    /// Creates an invocation.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Outcome of one invocation, as returned to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultTurn {
    /// Identity of the invocation this answers.
    pub invocation_id: String,
    /// Result content.
    pub content: String,
    /// Whether the call failed.
    pub is_error: bool,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Text from our side.
    User {
        /// Message text.
        text: String,
    },
    /// A model response.
    Model {
        /// Free text, if any.
        text: Option<String>,
        /// Requested tool calls, in order.
        invocations: Vec<ToolInvocation>,
    },
    /// Results for every invocation of the preceding model turn.
    ToolResults(Vec<ToolResultTurn>),
}

/// Everything the service needs for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    /// System prompt.
    pub system: &'a str,
    /// Full history, oldest first.
    pub history: &'a [Turn],
    /// Tools the model may call.
    pub tools: &'a [ToolDefinition],
    /// Output token limit.
    pub max_output_tokens: u64,
}

/// A model response: text, tool invocations, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Free text, if any.
    pub text: Option<String>,
    /// Requested tool calls, in order.
    pub invocations: Vec<ToolInvocation>,
    /// Tokens spent on this call.
    pub usage: TokenUsage,
}

/// The external reasoning service.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Sends the history and returns the next model response.
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError>;
}

#[async_trait]
impl<S: ReasoningService + ?Sized> ReasoningService for Arc<S> {
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
        (**self).send(request).await
    }
}
