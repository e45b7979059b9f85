use std::sync::Arc;
use std::time::Duration;

use rig::completion::ToolDefinition;
use serde_json::Value;
use tokio::time::Instant;

use super::{
    FailureKind, ModelRequest, ReasoningService, RunFailure, RunOutcome, RunResult, ToolCall,
    ToolInvocation, ToolResultTurn, Turn,
};
use crate::confidence::calibrate;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evidence::EvidenceContext;
use crate::feedback::{build_continue_prompt, build_validation_feedback, duplicate_finalize_message};
use crate::few_shot::ExampleSnapshot;
use crate::metrics::TokenUsage;
use crate::profile::SourceProfile;
use crate::prompt::{COMPACTED_SOURCE, system_prompt, task_prompt};
use crate::record::Biography;
use crate::source::SourceDocument;
use crate::tools::{ToolContext, ToolErrorKind, ToolRegistry, ToolResult};
use crate::validation::FieldError;

enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolInvocation>),
    Terminated(RunOutcome),
}

/// Mutable state of one run. Dropped at termination; only the record, trace
/// and counters survive in the [`RunResult`].
struct RunState {
    history: Vec<Turn>,
    trace: Vec<ToolCall>,
    usage: TokenUsage,
    turns: usize,
    finalize_rejections: usize,
    accepted: Option<Biography>,
}

struct DispatchStep {
    results: Vec<ToolResultTurn>,
    fatal: Option<String>,
}

/// Drives one source document to a [`RunResult`].
///
/// ```text
/// AwaitingModel -> DispatchingTools -> AwaitingModel | Terminated
/// ```
///
/// A run terminates when the finalize tool accepts a record, when the turn
/// budget is spent, when the service fails after its retries, or when a
/// tool reports a configuration error. Tool failures of any other kind are
/// returned to the model and the run goes on.
pub struct ConversationLoop<S> {
    service: S,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    profile: SourceProfile,
    finalize_tool: String,
    record_schema: Value,
}

impl<S: ReasoningService> ConversationLoop<S> {
    /// Creates a loop over `service` and `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `config` does not validate or
    /// the registry has no finalize tool.
    pub fn new(
        service: S,
        registry: Arc<ToolRegistry>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let finalize_tool = registry
            .finalize_tool()
            .ok_or_else(|| {
                EngineError::InvalidConfig("the tool registry has no finalize tool".into())
            })?
            .to_string();
        Ok(Self {
            service,
            registry,
            config,
            profile: SourceProfile::universal(),
            finalize_tool,
            record_schema: Biography::json_schema(),
        })
    }

    /// Uses `profile` for prompts instead of the universal profile.
    #[must_use]
    pub fn with_profile(mut self, profile: SourceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs one extraction to completion. Never fails: every ending is a
    /// [`RunResult`].
    pub async fn run(&self, source: &SourceDocument, examples: &ExampleSnapshot) -> RunResult {
        let start = Instant::now();
        let mut evidence = EvidenceContext::new();
        let source_ref = evidence.register(source.text.as_str());

        let system = system_prompt(&self.profile, examples);
        let tools = self.registry.definitions();
        let mut run = RunState {
            history: vec![Turn::User {
                text: task_prompt(source, &source_ref, &self.profile),
            }],
            trace: Vec::new(),
            usage: TokenUsage::default(),
            turns: 0,
            finalize_rejections: 0,
            accepted: None,
        };

        let outcome = {
            let ctx = ToolContext {
                evidence: &evidence,
                source_ref: &source_ref,
                source_url: &source.source_url,
            };
            self.drive(&mut run, &system, &tools, &ctx).await
        };
        evidence.release(&source_ref);

        let result = RunResult {
            source_url: source.source_url.clone(),
            outcome,
            trace: run.trace,
            turns: run.turns,
            finalize_rejections: run.finalize_rejections,
            usage: run.usage,
            elapsed: start.elapsed(),
        };

        match result.failure() {
            None => tracing::info!(
                event = "run_terminated",
                source_url = %result.source_url,
                success = true,
                turns = result.turns,
                tool_calls = result.trace.len(),
                "Run completed"
            ),
            Some(failure) => tracing::warn!(
                event = "run_terminated",
                source_url = %result.source_url,
                success = false,
                reason = failure.kind.as_str(),
                turns = result.turns,
                tool_calls = result.trace.len(),
                error = %failure.message,
                "Run failed"
            ),
        }
        result
    }

    async fn drive(
        &self,
        run: &mut RunState,
        system: &str,
        tools: &[ToolDefinition],
        ctx: &ToolContext<'_>,
    ) -> RunOutcome {
        let max_turns = self.config.max_turns;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel if run.turns >= max_turns => {
                    LoopState::Terminated(RunOutcome::Failed {
                        failure: RunFailure::new(
                            FailureKind::BudgetExceeded,
                            format!(
                                "Maximum turns ({max_turns}) reached without an accepted record"
                            ),
                        ),
                    })
                }
                LoopState::AwaitingModel => {
                    run.turns += 1;
                    tracing::debug!(
                        event = "turn_started",
                        turn = run.turns,
                        max_turns,
                        "Calling reasoning service"
                    );

                    let request = ModelRequest {
                        system,
                        history: &run.history,
                        tools,
                        max_output_tokens: self.config.max_output_tokens,
                    };
                    match self.service.send(&request).await {
                        Ok(response) => {
                            run.usage += response.usage;
                            let invocations = response.invocations.clone();
                            run.history.push(Turn::Model {
                                text: response.text,
                                invocations: response.invocations,
                            });
                            if run.turns == 1 && self.config.compact_source_after_first_turn {
                                compact_source(&mut run.history);
                            }
                            if invocations.is_empty() {
                                run.history.push(Turn::User {
                                    text: build_continue_prompt(
                                        &self.finalize_tool,
                                        run.turns,
                                        max_turns,
                                    ),
                                });
                                LoopState::AwaitingModel
                            } else {
                                LoopState::DispatchingTools(invocations)
                            }
                        }
                        Err(e) => LoopState::Terminated(RunOutcome::Failed {
                            failure: RunFailure::new(FailureKind::Transport, e.to_string()),
                        }),
                    }
                }
                LoopState::DispatchingTools(invocations) => {
                    let step = self.dispatch_all(run, invocations, ctx).await;
                    run.history.push(Turn::ToolResults(step.results));
                    if let Some(message) = step.fatal {
                        LoopState::Terminated(RunOutcome::Failed {
                            failure: RunFailure::new(FailureKind::Configuration, message),
                        })
                    } else if let Some(record) = run.accepted.clone() {
                        LoopState::Terminated(RunOutcome::Completed { record })
                    } else {
                        LoopState::AwaitingModel
                    }
                }
                LoopState::Terminated(outcome) => return outcome,
            };
        }
    }

    /// Dispatches every invocation of one model turn, in order, producing a
    /// result for each.
    async fn dispatch_all(
        &self,
        run: &mut RunState,
        invocations: Vec<ToolInvocation>,
        ctx: &ToolContext<'_>,
    ) -> DispatchStep {
        let mut step = DispatchStep {
            results: Vec::with_capacity(invocations.len()),
            fatal: None,
        };

        for invocation in invocations {
            let is_finalize = invocation.name == self.finalize_tool;

            let mut result = if is_finalize && run.accepted.is_some() {
                tracing::warn!(
                    event = "finalize_rejected",
                    tool = %invocation.name,
                    turn = run.turns,
                    "Finalize called after a record was accepted; payload ignored"
                );
                ToolResult::failure(
                    &invocation.name,
                    ToolErrorKind::ProtocolViolation,
                    duplicate_finalize_message(&self.finalize_tool),
                    None,
                    Duration::ZERO,
                )
            } else {
                self.registry
                    .dispatch(&invocation.name, invocation.input.clone(), ctx)
                    .await
            };

            let mut content = None;
            if is_finalize && run.accepted.is_none() {
                if result.success {
                    match self.accept(&result, &run.trace) {
                        Ok(record) => run.accepted = Some(record),
                        Err(message) => {
                            result = ToolResult::failure(
                                &invocation.name,
                                ToolErrorKind::Execution,
                                message,
                                None,
                                result.duration,
                            );
                        }
                    }
                } else if result.error_kind == Some(ToolErrorKind::Validation) {
                    run.finalize_rejections += 1;
                    content = Some(self.validation_feedback(
                        &result,
                        run.finalize_rejections,
                        run.turns,
                    ));
                }
            }

            match result.error_kind {
                Some(kind @ (ToolErrorKind::ProtocolViolation | ToolErrorKind::UnknownTool)) => {
                    tracing::warn!(
                        event = "protocol_violation",
                        tool = %invocation.name,
                        kind = kind.as_str(),
                        turn = run.turns,
                        "Protocol violation recorded"
                    );
                }
                Some(ToolErrorKind::Configuration) if step.fatal.is_none() => {
                    step.fatal = result.error.clone();
                }
                _ => {}
            }

            step.results.push(ToolResultTurn {
                invocation_id: invocation.id.clone(),
                content: content.unwrap_or_else(|| result.to_model_content()),
                is_error: !result.success,
            });
            run.trace.push(ToolCall::record(&invocation, &result));
        }

        step
    }

    /// Reads the accepted record out of a successful finalize result and
    /// calibrates its confidence against the trace so far.
    fn accept(&self, result: &ToolResult, trace: &[ToolCall]) -> Result<Biography, String> {
        let payload = result
            .data
            .as_ref()
            .and_then(|data| data.get("record"))
            .cloned()
            .ok_or_else(|| "finalize result carries no record".to_string())?;
        let mut record: Biography = serde_json::from_value(payload)
            .map_err(|e| format!("finalize result is not a record: {e}"))?;
        if self.config.calibrate_confidence {
            record.confidence = calibrate(&record, trace);
        }
        Ok(record)
    }

    fn validation_feedback(&self, result: &ToolResult, attempt: usize, turn: usize) -> String {
        let details = result.data.as_ref();
        let errors: Vec<FieldError> = details
            .and_then(|d| d.get("errors"))
            .and_then(|e| serde_json::from_value(e.clone()).ok())
            .unwrap_or_default();
        let submission = details
            .and_then(|d| d.get("submission"))
            .cloned()
            .unwrap_or(Value::Null);
        let schema = self
            .config
            .include_schema_in_feedback
            .then_some(&self.record_schema);
        build_validation_feedback(
            &submission,
            &errors,
            attempt,
            turn,
            self.config.max_turns,
            schema,
        )
    }
}

fn compact_source(history: &mut [Turn]) {
    if let Some(Turn::User { text }) = history.first_mut() {
        let original_chars = text.chars().count();
        *text = COMPACTED_SOURCE.to_string();
        tracing::debug!(
            event = "source_compacted",
            original_chars,
            "Replaced source text in history"
        );
    }
}
