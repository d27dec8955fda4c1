use concierge_core::{FailureClass, Message, ToolCall, ToolSchema};
use async_trait::async_trait;
use thiserror::Error;

/// What a provider produced for a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// A final answer for the user.
    Answer(String),
    /// The provider wants a tool executed before it answers.
    ToolRequest {
        /// Text the provider emitted alongside the request, if any.
        content: Option<String>,
        /// The requested call.
        call: ToolCall,
    },
}

/// A failed provider call, classified by the adapter that made it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct ProviderFailure {
    /// Whether another provider is likely to do better.
    pub class: FailureClass,
    /// Human-readable reason, usually including the HTTP status.
    pub reason: String,
}

impl ProviderFailure {
    /// A transient failure: quota, rate limit, outage or timeout.
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Retryable,
            reason: reason.into(),
        }
    }

    /// A failure that will repeat: bad request, auth, content policy.
    pub fn non_retryable(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::NonRetryable,
            reason: reason.into(),
        }
    }
}

/// A completion backend.
///
/// Each adapter (Claude, OpenAI-compatible, test mocks) implements this
/// trait and is responsible for tagging its own failures as retryable or
/// not. System instructions travel inside `conversation` as
/// [`Role::System`](concierge_core::Role::System) messages.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in logs and attempt reports.
    fn name(&self) -> &str;

    /// Complete `conversation`, optionally offering `tools`.
    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Completion, ProviderFailure>;
}
