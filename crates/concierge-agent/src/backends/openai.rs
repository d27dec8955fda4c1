use super::{http_client, status_failure, transport_failure};
use crate::config::{ProviderConfig, ProviderKind};
use crate::provider::{Completion, Provider, ProviderFailure};
use concierge_core::{ConciergeResult, Message, Role, ToolCall, ToolSchema};
use async_trait::async_trait;
use tracing::warn;

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq and any other provider that implements
/// the OpenAI chat completions API.
pub struct OpenAiProvider {
    name: String,
    config: ProviderConfig,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiProvider {
    /// Build the adapter, resolving the API key up front.
    pub fn new(config: ProviderConfig) -> ConciergeResult<Self> {
        Ok(Self {
            name: config.display_name(),
            api_key: config.resolve_api_key()?,
            http: http_client(&config)?,
            config,
        })
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, ProviderKind::OpenRouter) {
            request.header("X-Title", "Concierge")
        } else {
            request
        }
    }
}

/// Convert a conversation to chat-completions `messages`.
pub fn build_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => serde_json::json!({"role": "system", "content": m.content}),
            Role::User => serde_json::json!({"role": "user", "content": m.content}),
            Role::Assistant => match &m.tool_call {
                Some(call) => serde_json::json!({
                    "role": "assistant",
                    "content": (!m.content.is_empty()).then_some(&m.content),
                    "tool_calls": [{
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    }]
                }),
                None => serde_json::json!({"role": "assistant", "content": m.content}),
            },
            Role::Tool => serde_json::json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id,
                "content": m.content,
            }),
        })
        .collect()
}

fn build_tools(tools: &[ToolSchema]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Completion, ProviderFailure> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": build_messages(conversation),
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(build_tools(tools));
        }

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_failure(&self.name, &e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| transport_failure(&self.name, &e))?;

        if !status.is_success() {
            return Err(status_failure(&self.name, status, &text));
        }

        let resp_body: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            ProviderFailure::non_retryable(format!("{}: invalid response body: {e}", self.name))
        })?;

        parse_openai_response(&resp_body)
    }
}

/// Normalize a chat-completions response body.
pub fn parse_openai_response(body: &serde_json::Value) -> Result<Completion, ProviderFailure> {
    let message = body["choices"][0]
        .get("message")
        .ok_or_else(|| ProviderFailure::non_retryable("missing choices in OpenAI response"))?;
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let mut tool_calls = Vec::new();
    for tc in message["tool_calls"].as_array().into_iter().flatten() {
        let (Some(id), Some(name)) = (tc["id"].as_str(), tc["function"]["name"].as_str()) else {
            continue;
        };
        let raw = tc["function"]["arguments"].as_str().unwrap_or("{}");
        let arguments: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            ProviderFailure::non_retryable(format!("invalid tool arguments for '{name}': {e}"))
        })?;
        tool_calls.push(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        });
    }

    if tool_calls.len() > 1 {
        warn!(
            count = tool_calls.len(),
            "Provider requested several tool calls, only the first is executed"
        );
    }

    match tool_calls.into_iter().next() {
        Some(call) => Ok(Completion::ToolRequest {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            call,
        }),
        None => Ok(Completion::Answer(content)),
    }
}
