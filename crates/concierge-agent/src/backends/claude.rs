use super::{http_client, status_failure, transport_failure};
use crate::config::ProviderConfig;
use crate::provider::{Completion, Provider, ProviderFailure};
use concierge_core::{ConciergeResult, Message, Role, ToolCall, ToolSchema};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude (Anthropic) Messages API backend.
pub struct ClaudeProvider {
    name: String,
    config: ProviderConfig,
    api_key: String,
    http: reqwest::Client,
}

impl ClaudeProvider {
    /// Build the adapter, resolving the API key up front.
    pub fn new(config: ProviderConfig) -> ConciergeResult<Self> {
        Ok(Self {
            name: config.display_name(),
            api_key: config.resolve_api_key()?,
            http: http_client(&config)?,
            config,
        })
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Completion, ProviderFailure> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let claude_tools: Vec<ClaudeTool<'_>> = tools
            .iter()
            .map(|t| ClaudeTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": build_messages(conversation),
        });

        if let Some(sys) = system_prompt(conversation) {
            body["system"] = serde_json::json!(sys);
        }

        if !claude_tools.is_empty() {
            body["tools"] = serde_json::json!(claude_tools);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
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

        parse_claude_response(&resp_body)
    }
}

// -- Claude wire types --

#[derive(Serialize)]
struct ClaudeTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

/// System messages are sent out of band, joined in order.
fn system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Convert a conversation to Messages API `messages`, system turns excluded.
pub fn build_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| match (&m.role, &m.tool_call) {
            (Role::Assistant, Some(call)) => {
                let mut blocks = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(serde_json::json!({"type": "text", "text": m.content}));
                }
                blocks.push(serde_json::json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments,
                }));
                serde_json::json!({"role": "assistant", "content": blocks})
            }
            (Role::Assistant, None) => {
                serde_json::json!({"role": "assistant", "content": m.content})
            }
            (Role::Tool, _) => serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id,
                    "content": m.content,
                    "is_error": m.is_tool_error(),
                }]
            }),
            _ => serde_json::json!({"role": "user", "content": m.content}),
        })
        .collect()
}

/// Normalize a Messages API response body.
pub fn parse_claude_response(body: &serde_json::Value) -> Result<Completion, ProviderFailure> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| ProviderFailure::non_retryable("missing content in Claude response"))?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_string());
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                let arguments = block["input"].clone();
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
            _ => {}
        }
    }

    if tool_calls.len() > 1 {
        warn!(
            count = tool_calls.len(),
            "Provider requested several tool calls, only the first is executed"
        );
    }

    match tool_calls.into_iter().next() {
        Some(call) => Ok(Completion::ToolRequest {
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            call,
        }),
        None => Ok(Completion::Answer(text_parts.join("\n"))),
    }
}
