//! The tool-calling loop: submit the conversation, act on the finish
//! reason, dispatch requested tools, repeat until the model stops.

use crate::config::InvalidArgumentPolicy;
use crate::error::CommandError;
use crate::llm::{ChatMessage, ChatModel, FinishReason};
use crate::storage::TimerStore;
use crate::tools::ToolRegistry;

/// Result of a conversation that ended with a final reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationOutcome {
    pub reply: String,
    /// Model calls made, including the final one.
    pub rounds: u32,
    /// Tool calls dispatched across all rounds.
    pub tool_calls: usize,
}

/// Drives one conversation. Borrows its collaborators; the message list is
/// owned by each [`run`](Self::run) call and never shared.
pub struct Orchestrator<'a, M, S> {
    model: &'a M,
    registry: &'a ToolRegistry,
    store: &'a S,
    max_rounds: u32,
    invalid_arguments: InvalidArgumentPolicy,
}

impl<'a, M: ChatModel, S: TimerStore> Orchestrator<'a, M, S> {
    pub fn new(model: &'a M, registry: &'a ToolRegistry, store: &'a S) -> Self {
        Self {
            model,
            registry,
            store,
            max_rounds: 8,
            invalid_arguments: InvalidArgumentPolicy::Abort,
        }
    }

    /// Upper bound on model calls. Zero is treated as one.
    pub fn max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn invalid_arguments(mut self, policy: InvalidArgumentPolicy) -> Self {
        self.invalid_arguments = policy;
        self
    }

    /// Run the loop from a seeded message list (system prompt plus user
    /// input). Only a `stop` finish with text ends it successfully.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
    ) -> Result<ConversationOutcome, CommandError> {
        let tools = self.registry.definitions();
        let mut tool_calls = 0usize;

        for round in 1..=self.max_rounds {
            tracing::debug!(
                target: "hark::llm",
                round,
                messages = messages.len(),
                "submitting conversation"
            );
            let completion = self
                .model
                .complete(&messages, tools)
                .await
                .map_err(CommandError::Model)?;

            match &completion.finish_reason {
                FinishReason::Stop => {
                    let reply = completion
                        .content
                        .as_deref()
                        .map(str::trim)
                        .filter(|text| !text.is_empty())
                        .map(str::to_string)
                        .ok_or(CommandError::EmptyReply)?;
                    messages.push(completion.to_message());
                    tracing::info!(target: "hark::llm", round, reply = %reply, "assistant response");
                    return Ok(ConversationOutcome {
                        reply,
                        rounds: round,
                        tool_calls,
                    });
                }
                FinishReason::ToolCalls => {
                    messages.push(completion.to_message());
                    for call in &completion.tool_calls {
                        tracing::info!(
                            target: "hark::llm",
                            round,
                            tool = %call.name,
                            arguments = %call.arguments,
                            "tool call"
                        );
                        let result = match self
                            .registry
                            .dispatch(&call.name, &call.arguments, self.store)
                            .await
                        {
                            Ok(text) => text,
                            Err(err)
                                if err.is_validation()
                                    && self.invalid_arguments == InvalidArgumentPolicy::Report =>
                            {
                                tracing::warn!(
                                    target: "hark::tool",
                                    tool = %call.name,
                                    error = %err,
                                    "reporting invalid arguments to the model"
                                );
                                format!("Error: {err}")
                            }
                            Err(err) => return Err(err.into()),
                        };
                        tool_calls += 1;
                        messages.push(ChatMessage::tool_result(&call.id, result));
                    }
                }
                FinishReason::Length => return Err(CommandError::Truncated),
                FinishReason::ContentFilter => return Err(CommandError::ContentFiltered),
                FinishReason::FunctionCall => return Err(CommandError::DeprecatedFunctionCall),
                FinishReason::Other(reason) => {
                    return Err(CommandError::UnrecognizedFinishReason(reason.clone()))
                }
            }
        }

        Err(CommandError::RoundsExhausted {
            max: self.max_rounds,
        })
    }
}
