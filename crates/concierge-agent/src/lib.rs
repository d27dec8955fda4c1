//! Provider fallback, HTTP adapters, tools and the chat service.
//!
//! [`FallbackInvoker`] walks an ordered list of [`Provider`]s until one
//! answers; [`ChatService`] puts rate limiting and the tool loop around it.

/// HTTP provider adapters.
pub mod backends;
/// Per-provider configuration.
pub mod config;
/// History truncation and system prompt placement.
pub mod context;
/// Ordered provider fallback.
pub mod failover;
/// The provider trait and its outcomes.
pub mod provider;
/// Rate-limited chat replies with tool execution.
pub mod service;
/// Tool trait, registry and built-in tools.
pub mod tools;

pub use backends::build_provider;
pub use config::{ProviderConfig, ProviderKind};
pub use context::ContextWindow;
pub use failover::{Answer, FallbackInvoker, Invocation, PendingToolCall};
pub use provider::{Completion, Provider, ProviderFailure};
pub use service::{ChatReply, ChatService};
pub use tools::{CurrentTimeTool, Tool, ToolExecutor, ToolRegistry};
