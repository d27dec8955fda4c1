use crate::provider::{Completion, Provider, ProviderFailure};
use concierge_core::{
    AttemptFailure, AttemptStage, ConciergeError, ConciergeResult, ExhaustedError, Message,
    ToolCall, ToolResult, ToolSchema,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A final answer and the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// Index of the serving provider in the priority list.
    pub provider_index: usize,
    /// Name of the serving provider.
    pub provider: String,
    /// Providers that failed before this one, in attempt order.
    pub failed_attempts: Vec<AttemptFailure>,
}

/// A provider asked for a tool and is waiting for its result.
///
/// Hand it back to [`FallbackInvoker::invoke_with_tool_result`] together with
/// the tool's output.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    /// Index of the provider waiting for the result.
    pub provider_index: usize,
    /// Name of the provider waiting for the result.
    pub provider: String,
    /// Text the provider emitted alongside the request.
    pub content: Option<String>,
    /// The requested call.
    pub call: ToolCall,
    /// Providers that failed before this one, in attempt order.
    pub failed_attempts: Vec<AttemptFailure>,
}

/// Non-failure outcome of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// A provider answered.
    Answered(Answer),
    /// A provider requested a tool call.
    ToolRequested(PendingToolCall),
}

enum State {
    Trying(usize),
    /// Provider `index` gets the conversation extended with a tool exchange.
    ToolPending {
        index: usize,
        conversation: Vec<Message>,
    },
}

/// Calls providers in priority order until one succeeds.
///
/// Every failure, retryable or not, moves on to the next provider; the class
/// is kept in the attempt log so an exhausted run can tell an outage from a
/// misconfiguration. Providers are called one at a time and each at most
/// once per stage.
pub struct FallbackInvoker {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackInvoker {
    /// Create an invoker over `providers`; list order is priority order.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> ConciergeResult<Self> {
        if providers.is_empty() {
            return Err(ConciergeError::Config(
                "at least one provider must be configured".into(),
            ));
        }
        Ok(Self { providers })
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Start a completion for `conversation` at the highest-priority provider.
    pub async fn invoke(
        &self,
        conversation: &[Message],
        tools: &[ToolSchema],
        cancel: &CancellationToken,
    ) -> ConciergeResult<Invocation> {
        self.run(State::Trying(0), conversation, tools, cancel, Vec::new())
            .await
    }

    /// Resume after the caller executed the tool `pending` asked for.
    ///
    /// `conversation` is the same conversation passed to the call that
    /// produced `pending`; the tool request and `result` are appended for the
    /// waiting provider only. If that provider fails, or asks for another
    /// tool, the remaining providers start over from `conversation`.
    pub async fn invoke_with_tool_result(
        &self,
        pending: PendingToolCall,
        conversation: &[Message],
        tools: &[ToolSchema],
        result: ToolResult,
        cancel: &CancellationToken,
    ) -> ConciergeResult<Invocation> {
        if result.call_id != pending.call.id {
            return Err(ConciergeError::Tool(format!(
                "tool result for '{}' does not match pending call '{}'",
                result.call_id, pending.call.id
            )));
        }

        let mut extended = conversation.to_vec();
        extended.push(Message::tool_request(pending.content, pending.call));
        extended.push(Message::tool_result(&result));

        let state = State::ToolPending {
            index: pending.provider_index,
            conversation: extended,
        };
        self.run(state, conversation, tools, cancel, pending.failed_attempts)
            .await
    }

    async fn run(
        &self,
        mut state: State,
        conversation: &[Message],
        tools: &[ToolSchema],
        cancel: &CancellationToken,
        mut failures: Vec<AttemptFailure>,
    ) -> ConciergeResult<Invocation> {
        loop {
            let (index, stage, messages) = match &state {
                State::Trying(index) => (*index, AttemptStage::Initial, conversation),
                State::ToolPending {
                    index,
                    conversation,
                } => (*index, AttemptStage::ToolResult, conversation.as_slice()),
            };

            let Some(provider) = self.providers.get(index) else {
                warn!(attempts = failures.len(), "All providers exhausted");
                return Err(ExhaustedError { attempts: failures }.into());
            };

            let outcome = attempt(provider.as_ref(), messages, tools, cancel).await?;

            let failure = match (stage, outcome) {
                (_, Ok(Completion::Answer(text))) => {
                    info!(
                        provider = %provider.name(),
                        provider_index = index,
                        failed_attempts = failures.len(),
                        "Provider answered"
                    );
                    return Ok(Invocation::Answered(Answer {
                        text,
                        provider_index: index,
                        provider: provider.name().to_string(),
                        failed_attempts: failures,
                    }));
                }
                (AttemptStage::Initial, Ok(Completion::ToolRequest { content, call })) => {
                    info!(
                        provider = %provider.name(),
                        provider_index = index,
                        tool = %call.name,
                        call_id = %call.id,
                        "Provider requested tool call"
                    );
                    return Ok(Invocation::ToolRequested(PendingToolCall {
                        provider_index: index,
                        provider: provider.name().to_string(),
                        content,
                        call,
                        failed_attempts: failures,
                    }));
                }
                (AttemptStage::ToolResult, Ok(Completion::ToolRequest { call, .. })) => {
                    ProviderFailure::non_retryable(format!(
                        "requested tool '{}' again after receiving a tool result",
                        call.name
                    ))
                }
                (_, Err(failure)) => failure,
            };

            warn!(
                provider = %provider.name(),
                provider_index = index,
                class = %failure.class,
                error = %failure.reason,
                "Provider failed, moving to next provider"
            );
            failures.push(AttemptFailure {
                provider_index: index,
                provider: provider.name().to_string(),
                class: failure.class,
                stage,
                reason: failure.reason,
            });
            state = State::Trying(index + 1);
        }
    }
}

/// One provider call that gives up as soon as `cancel` fires.
async fn attempt(
    provider: &dyn Provider,
    messages: &[Message],
    tools: &[ToolSchema],
    cancel: &CancellationToken,
) -> ConciergeResult<Result<Completion, ProviderFailure>> {
    if cancel.is_cancelled() {
        return Err(ConciergeError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(provider = %provider.name(), "Provider call cancelled");
            Err(ConciergeError::Cancelled)
        }
        result = provider.complete(messages, tools) => Ok(result),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
