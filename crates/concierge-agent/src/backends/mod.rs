/// Anthropic Messages API.
pub mod claude;
/// OpenAI-compatible chat completions.
pub mod openai;

use crate::config::{ProviderConfig, ProviderKind};
use crate::provider::{Provider, ProviderFailure};
use concierge_core::{ConciergeError, ConciergeResult, FailureClass};
use reqwest::StatusCode;
use std::sync::Arc;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;

/// Build the HTTP provider adapter for `config`.
///
/// To add a new backend:
/// 1. Create a new module in `backends/`
/// 2. Implement `Provider` for your struct, classifying failures with
///    [`classify_status`] / [`transport_failure`]
/// 3. Add the variant to `ProviderKind` in `config.rs`
/// 4. Wire it up here
pub fn build_provider(config: ProviderConfig) -> ConciergeResult<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Claude => Arc::new(ClaudeProvider::new(config)?),
        ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Groq => {
            Arc::new(OpenAiProvider::new(config)?)
        }
    };
    Ok(provider)
}

/// Map an HTTP error status to a failure class.
///
/// Throttling, conflicts, request timeouts and any 5xx are worth handing to
/// the next provider; other 4xx responses mean the request itself or our
/// credentials are wrong.
pub fn classify_status(status: StatusCode) -> FailureClass {
    match status.as_u16() {
        408 | 409 | 425 | 429 => FailureClass::Retryable,
        code if code >= 500 => FailureClass::Retryable,
        _ => FailureClass::NonRetryable,
    }
}

/// Classify a `reqwest` error raised before a status was available.
pub fn transport_failure(provider: &str, err: &reqwest::Error) -> ProviderFailure {
    let reason = format!("{provider} request failed: {err}");
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ProviderFailure::retryable(reason)
    } else {
        ProviderFailure::non_retryable(reason)
    }
}

/// Turn a non-2xx response into a classified failure.
pub(crate) fn status_failure(provider: &str, status: StatusCode, body: &str) -> ProviderFailure {
    ProviderFailure {
        class: classify_status(status),
        reason: format!("{provider} API error {status}: {body}"),
    }
}

pub(crate) fn http_client(config: &ProviderConfig) -> ConciergeResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| ConciergeError::Http(e.to_string()))
}
