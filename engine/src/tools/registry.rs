//! Name-keyed dispatch table for tool executors.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use jsonschema::Validator;
use rig::completion::ToolDefinition;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::{ToolContext, ToolError, ToolErrorKind, ToolExecutor, ToolResult};
use crate::error::EngineError;

/// Default deadline for a single tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

type SyncToolFn = dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync;

/// A tool backed by a synchronous closure.
pub struct FnTool {
    definition: ToolDefinition,
    func: Arc<SyncToolFn>,
}

impl FnTool {
    /// Wraps `func` under the given name, description and input schema.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl ToolExecutor for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        (self.func)(input)
    }
}

struct RegisteredTool {
    executor: Arc<dyn ToolExecutor>,
    input_validator: Option<Validator>,
    timeout: Duration,
}

/// Registry of the tools available to a run.
///
/// Built once at startup and shared read-only between runs. One tool may be
/// designated as the finalize tool; its successful call ends a run.
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    default_timeout: Duration,
    finalize_tool: Option<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Creates an empty registry with [`DEFAULT_TOOL_TIMEOUT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            finalize_tool: None,
        }
    }

    /// Sets the timeout applied to tools registered without their own.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Registers `executor` under the name in its definition.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateTool`] if the name is taken, or
    /// [`EngineError::Schema`] if the input schema does not compile.
    pub fn register(&mut self, executor: impl ToolExecutor + 'static) -> Result<(), EngineError> {
        let timeout = self.default_timeout;
        self.register_with_timeout(executor, timeout)
    }

    /// Registers `executor` with its own execution deadline.
    ///
    /// # Errors
    ///
    /// See [`Self::register`].
    pub fn register_with_timeout(
        &mut self,
        executor: impl ToolExecutor + 'static,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let definition = executor.definition();
        if self.tools.contains_key(&definition.name) {
            return Err(EngineError::DuplicateTool(definition.name));
        }
        let input_validator = if executor.validates_input() {
            Some(Validator::new(&definition.parameters).map_err(|e| {
                EngineError::Schema(format!("input schema of tool '{}': {e}", definition.name))
            })?)
        } else {
            None
        };
        self.tools.insert(
            definition.name,
            RegisteredTool {
                executor: Arc::new(executor),
                input_validator,
                timeout,
            },
        );
        Ok(())
    }

    /// Registers a synchronous closure as a tool.
    ///
    /// # Errors
    ///
    /// See [`Self::register`].
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: F,
    ) -> Result<(), EngineError>
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(FnTool::new(name, description, parameters, func))
    }

    /// Marks a registered tool as the finalize tool.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if no such tool is registered.
    pub fn designate_finalize(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.tools.contains_key(name) {
            return Err(EngineError::InvalidConfig(format!(
                "finalize tool '{name}' is not registered"
            )));
        }
        self.finalize_tool = Some(name.to_string());
        Ok(())
    }

    /// Name of the finalize tool, if one was designated.
    #[must_use]
    pub fn finalize_tool(&self) -> Option<&str> {
        self.finalize_tool.as_deref()
    }

    /// Registered tool names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of every registered tool, for declaring to the service.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.executor.definition()).collect()
    }

    /// Runs the tool registered under `name`.
    ///
    /// Never fails and never panics: unknown names, schema mismatches,
    /// executor errors, timeouts and executor panics all come back as a
    /// failed [`ToolResult`].
    pub async fn dispatch(&self, name: &str, input: Value, ctx: &ToolContext<'_>) -> ToolResult {
        let start = Instant::now();

        let Some(tool) = self.tools.get(name) else {
            let known = self.names();
            tracing::warn!(
                event = "tool_failed",
                tool = name,
                kind = "unknown_tool",
                "Unknown tool requested"
            );
            return ToolResult::failure(
                name,
                ToolErrorKind::UnknownTool,
                format!("Unknown tool '{name}'. Known tools: {}", known.join(", ")),
                Some(json!({ "known_tools": known })),
                start.elapsed(),
            );
        };

        if let Some(validator) = &tool.input_validator {
            let errors: Vec<String> = validator
                .iter_errors(&input)
                .map(|error| format!("At path '{}': {error}", error.instance_path))
                .collect();
            if !errors.is_empty() {
                let result = ToolResult::failure(
                    name,
                    ToolErrorKind::InvalidInput,
                    format!("Input does not match the schema of '{name}'"),
                    Some(json!({ "errors": errors })),
                    start.elapsed(),
                );
                log_result(&result);
                return result;
            }
        }

        let execution = AssertUnwindSafe(tool.executor.execute(input, ctx)).catch_unwind();
        let result = match tokio::time::timeout(tool.timeout, execution).await {
            Ok(Ok(Ok(data))) => ToolResult::success(name, data, start.elapsed()),
            Ok(Ok(Err(error))) => ToolResult::from_error(name, &error, start.elapsed()),
            Ok(Err(panic)) => ToolResult::failure(
                name,
                ToolErrorKind::Panicked,
                format!("Tool '{name}' panicked: {}", panic_message(panic.as_ref())),
                None,
                start.elapsed(),
            ),
            Err(_) => ToolResult::failure(
                name,
                ToolErrorKind::Timeout,
                format!("Tool '{name}' timed out after {:?}", tool.timeout),
                None,
                start.elapsed(),
            ),
        };

        log_result(&result);
        result
    }
}

fn log_result(result: &ToolResult) {
    let duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX);
    if result.success {
        tracing::info!(
            event = "tool_dispatched",
            tool = %result.tool_name,
            duration_ms,
            "Tool call succeeded"
        );
    } else {
        tracing::warn!(
            event = "tool_failed",
            tool = %result.tool_name,
            duration_ms,
            kind = result.error_kind.map_or("unknown", |kind| kind.as_str()),
            error = result.error.as_deref().unwrap_or_default(),
            "Tool call failed"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
