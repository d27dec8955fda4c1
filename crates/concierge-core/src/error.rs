use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A convenience `Result` alias using [`ConciergeError`].
pub type ConciergeResult<T> = Result<T, ConciergeError>;

/// Top-level error type for the Concierge framework.
///
/// Per-provider failures never appear here directly: the fallback invoker
/// folds them into [`ConciergeError::Exhausted`] once every provider failed.
#[derive(Error, Debug)]
pub enum ConciergeError {
    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised while executing a tool on behalf of a provider.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The tenant exceeded its request quota.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the oldest in-window request expires.
        retry_after_secs: u64,
    },

    /// Every configured provider failed.
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    /// The caller cancelled the operation or its deadline elapsed.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Whether trying another provider after a failure is likely to help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Quota, rate limit, transient network/server error or timeout.
    Retryable,
    /// Malformed request, authentication failure or content policy rejection.
    NonRetryable,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Retryable => f.write_str("retryable"),
            FailureClass::NonRetryable => f.write_str("non-retryable"),
        }
    }
}

/// Which call to a provider produced an [`AttemptFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    /// The first completion request for the conversation.
    Initial,
    /// The follow-up request carrying a tool result.
    ToolResult,
}

/// A single failed provider call, as recorded by the fallback invoker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Position of the provider in the configured priority list.
    pub provider_index: usize,
    /// Provider name.
    pub provider: String,
    /// Failure class reported by the provider adapter.
    pub class: FailureClass,
    /// Which call failed.
    pub stage: AttemptStage,
    /// Human-readable failure reason.
    pub reason: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}",
            self.provider_index, self.provider, self.class
        )?;
        if self.stage == AttemptStage::ToolResult {
            f.write_str(", tool result")?;
        }
        write!(f, "): {}", self.reason)
    }
}

/// All configured providers failed; attempts are kept in the order they ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustedError {
    /// Every failed attempt, oldest first.
    pub attempts: Vec<AttemptFailure>,
}

impl ExhaustedError {
    /// True when no attempt failed for a transient reason, which usually
    /// points at misconfiguration rather than an outage.
    pub fn all_non_retryable(&self) -> bool {
        self.attempts
            .iter()
            .all(|a| a.class == FailureClass::NonRetryable)
    }
}

impl fmt::Display for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All {} provider attempt(s) failed", self.attempts.len())?;
        for attempt in &self.attempts {
            write!(f, "; {attempt}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExhaustedError {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn failure(index: usize, class: FailureClass, reason: &str) -> AttemptFailure {
        AttemptFailure {
            provider_index: index,
            provider: format!("p{index}"),
            class,
            stage: AttemptStage::Initial,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_exhausted_display_lists_attempts_in_order() {
        let err = ExhaustedError {
            attempts: vec![
                failure(0, FailureClass::Retryable, "429 Too Many Requests"),
                failure(1, FailureClass::NonRetryable, "401 Unauthorized"),
            ],
        };
        let msg = err.to_string();
        let first = msg.find("429").unwrap();
        let second = msg.find("401").unwrap();
        assert!(first < second);
        assert!(msg.starts_with("All 2 provider attempt(s) failed"));
    }

    #[test]
    fn test_all_non_retryable() {
        let err = ExhaustedError {
            attempts: vec![failure(0, FailureClass::NonRetryable, "bad request")],
        };
        assert!(err.all_non_retryable());

        let err = ExhaustedError {
            attempts: vec![
                failure(0, FailureClass::NonRetryable, "bad request"),
                failure(1, FailureClass::Retryable, "503"),
            ],
        };
        assert!(!err.all_non_retryable());
    }

    #[test]
    fn test_tool_result_stage_is_marked() {
        let mut f = failure(2, FailureClass::NonRetryable, "nested tool request");
        f.stage = AttemptStage::ToolResult;
        assert_eq!(
            f.to_string(),
            "#2 p2 (non-retryable, tool result): nested tool request"
        );
    }

    #[test]
    fn test_rate_limited_display() {
        let err = ConciergeError::RateLimited { retry_after_secs: 7 };
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 7s");
    }
}
