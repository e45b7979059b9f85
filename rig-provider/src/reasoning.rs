//! [`ReasoningService`] over any Rig completion model.

use async_trait::async_trait;
use bioforge_engine::conversation::{
    ModelRequest, ModelResponse, ReasoningService, ToolInvocation, Turn,
};
use bioforge_engine::error::ServiceError;
use bioforge_engine::metrics::{TokenUsage, estimate_tokens};
use rig::OneOrMany;
use rig::completion::message::{AssistantContent, Message, ToolResultContent, UserContent};
use rig::completion::{CompletionError, CompletionModel};

/// Sends engine conversations to a Rig [`CompletionModel`].
///
/// The engine history maps onto Rig messages one to one: user turns and
/// tool results become user messages, model turns become assistant messages
/// carrying their text and tool calls.
#[derive(Clone)]
pub struct RigReasoningService<M> {
    model: M,
}

impl<M: CompletionModel> RigReasoningService<M> {
    /// Wraps `model`.
    #[must_use]
    pub const fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> ReasoningService for RigReasoningService<M>
where
    M: CompletionModel + Send + Sync,
{
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
        let mut messages = to_messages(request.history);
        let prompt = messages
            .pop()
            .ok_or_else(|| ServiceError::Api("conversation history is empty".to_string()))?;

        let response = self
            .model
            .completion_request(prompt)
            .preamble(request.system.to_string())
            .messages(messages)
            .tools(request.tools.to_vec())
            .max_tokens(request.max_output_tokens)
            .send()
            .await
            .map_err(classify_error)?;

        let mut text = Vec::new();
        let mut invocations = Vec::new();
        for content in response.choice {
            match content {
                AssistantContent::Text(t) => text.push(t.text),
                AssistantContent::ToolCall(call) => invocations.push(ToolInvocation::new(
                    call.id,
                    call.function.name,
                    call.function.arguments,
                )),
                _ => {}
            }
        }
        let text = (!text.is_empty()).then(|| text.join("\n"));

        let usage = if response.usage.input_tokens == 0 && response.usage.output_tokens == 0 {
            estimated_usage(request, text.as_deref())
        } else {
            TokenUsage::single_call(response.usage.input_tokens, response.usage.output_tokens)
        };

        Ok(ModelResponse {
            text,
            invocations,
            usage,
        })
    }
}

/// Maps engine turns onto Rig messages.
pub(crate) fn to_messages(history: &[Turn]) -> Vec<Message> {
    history.iter().filter_map(to_message).collect()
}

fn to_message(turn: &Turn) -> Option<Message> {
    match turn {
        Turn::User { text } => Some(Message::user(text.clone())),
        Turn::Model { text, invocations } => {
            let content: Vec<AssistantContent> = text
                .iter()
                .map(|t| AssistantContent::text(t.clone()))
                .chain(invocations.iter().map(|invocation| {
                    AssistantContent::tool_call(
                        invocation.id.clone(),
                        invocation.name.clone(),
                        invocation.input.clone(),
                    )
                }))
                .collect();
            OneOrMany::many(content)
                .ok()
                .map(|content| Message::Assistant { id: None, content })
        }
        Turn::ToolResults(results) => {
            let content: Vec<UserContent> = results
                .iter()
                .map(|result| {
                    UserContent::tool_result(
                        result.invocation_id.clone(),
                        OneOrMany::one(ToolResultContent::text(result.content.clone())),
                    )
                })
                .collect();
            OneOrMany::many(content).ok().map(|content| Message::User { content })
        }
    }
}

fn estimated_usage(request: &ModelRequest<'_>, output: Option<&str>) -> TokenUsage {
    let history: u64 = request
        .history
        .iter()
        .map(|turn| match turn {
            Turn::User { text } => estimate_tokens(text),
            Turn::Model { text, invocations } => {
                text.as_deref().map_or(0, estimate_tokens)
                    + invocations
                        .iter()
                        .map(|i| estimate_tokens(&i.input.to_string()))
                        .sum::<u64>()
            }
            Turn::ToolResults(results) => results.iter().map(|r| estimate_tokens(&r.content)).sum(),
        })
        .sum();
    TokenUsage::single_call(
        estimate_tokens(request.system) + history,
        output.map_or(0, estimate_tokens),
    )
}

/// Classifies a Rig completion error for the retry layer.
pub(crate) fn classify_error(error: CompletionError) -> ServiceError {
    match error {
        CompletionError::HttpError(e) => ServiceError::Connection(e.to_string()),
        CompletionError::ProviderError(message) => classify_provider_message(message),
        other => ServiceError::Api(other.to_string()),
    }
}

fn classify_provider_message(message: String) -> ServiceError {
    let lower = message.to_lowercase();
    if ["rate limit", "rate_limit", "429", "overloaded"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        ServiceError::RateLimited(message)
    } else if ["timed out", "timeout", "connection"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        ServiceError::Connection(message)
    } else {
        ServiceError::Api(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioforge_engine::conversation::ToolResultTurn;
    use serde_json::json;

    #[test]
    fn test_history_maps_to_messages() {
        let history = vec![
            Turn::User {
                text: "Extract the record.".into(),
            },
            Turn::Model {
                text: Some("Checking dates first.".into()),
                invocations: vec![ToolInvocation::new(
                    "toolu_1",
                    "validate_dates",
                    json!({"birth_date": "1943"}),
                )],
            },
            Turn::ToolResults(vec![ToolResultTurn {
                invocation_id: "toolu_1".into(),
                content: r#"{"valid":true}"#.into(),
                is_error: false,
            }]),
        ];

        let messages = to_messages(&history);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], Message::User { .. }));
        match &messages[1] {
            Message::Assistant { content, .. } => {
                assert_eq!(content.len(), 2);
                assert!(content.iter().any(
                    |c| matches!(c, AssistantContent::ToolCall(call) if call.id == "toolu_1")
                ));
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
        match &messages[2] {
            Message::User { content } => {
                assert!(matches!(
                    content.first(),
                    UserContent::ToolResult(result) if result.id == "toolu_1"
                ));
            }
            other => panic!("expected tool results, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_model_turn_is_skipped() {
        let history = vec![Turn::Model {
            text: None,
            invocations: Vec::new(),
        }];
        assert!(to_messages(&history).is_empty());
    }

    #[test]
    fn test_provider_messages_are_classified() {
        assert!(matches!(
            classify_provider_message("429 Too Many Requests: rate_limit_error".into()),
            ServiceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_provider_message("Overloaded".into()),
            ServiceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_provider_message("connection reset by peer".into()),
            ServiceError::Connection(_)
        ));
        assert!(matches!(
            classify_provider_message("invalid x-api-key".into()),
            ServiceError::Api(_)
        ));
        let error = CompletionError::ProviderError("invalid x-api-key".into());
        assert!(!classify_error(error).is_retryable());
    }
}
