//! Core types and error definitions for the Concierge framework.
//!
//! This crate provides the foundational types shared across all Concierge
//! crates: error handling, conversation messages, and tool call abstractions.
//!
//! # Main types
//!
//! - [`ConciergeError`]: Unified error enum for all Concierge subsystems.
//! - [`ConciergeResult`]: Convenience alias for `Result<T, ConciergeError>`.
//! - [`ExhaustedError`]: Per-attempt report produced when every provider failed.
//! - [`FailureClass`]: Retryable / non-retryable tag set by provider adapters.
//! - [`Message`]: A single message within a conversation.
//! - [`ToolCall`] / [`ToolResult`] / [`ToolSchema`]: Tool invocation types.

/// Error types.
pub mod error;
/// Conversation messages.
pub mod message;
/// Tool call, result and schema types.
pub mod tool;

pub use error::{
    AttemptFailure, AttemptStage, ConciergeError, ConciergeResult, ExhaustedError, FailureClass,
};
pub use message::{Message, Role};
pub use tool::{ToolCall, ToolResult, ToolSchema};
