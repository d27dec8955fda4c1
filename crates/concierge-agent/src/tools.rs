use concierge_core::{ConciergeError, ConciergeResult, ToolCall, ToolResult, ToolSchema};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A business-logic function a provider may ask to run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and argument schema advertised to providers.
    fn schema(&self) -> &ToolSchema;

    /// Run `call` for `tenant_id`.
    async fn execute(&self, tenant_id: &str, call: &ToolCall) -> ConciergeResult<ToolResult>;
}

/// Executes tool calls on behalf of the chat service.
///
/// Never fails: problems are reported back to the provider as error
/// [`ToolResult`]s so it can explain them to the user.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Schemas advertised to providers.
    fn schemas(&self) -> Vec<ToolSchema>;

    /// Run `call`, reporting any failure as an error result.
    async fn execute(&self, tenant_id: &str, call: &ToolCall) -> ToolResult;
}

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Add `tool`, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.tools.values().map(|t| t.schema().clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    async fn execute(&self, tenant_id: &str, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tenant = %tenant_id, tool = %call.name, "Unknown tool requested");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };

        match tool.execute(tenant_id, call).await {
            Ok(result) => result,
            Err(e) => {
                error!(tenant = %tenant_id, tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
        }
    }
}

/// Reports the current UTC time, so the assistant can answer questions such
/// as "are you open now?".
pub struct CurrentTimeTool {
    schema: ToolSchema,
}

impl CurrentTimeTool {
    /// The `current_time` tool.
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                name: "current_time".to_string(),
                description: "Returns the current date and time in UTC (RFC 3339).".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {},
                }),
            },
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, _tenant_id: &str, call: &ToolCall) -> ConciergeResult<ToolResult> {
        if !call.arguments.is_null() && !call.arguments.is_object() {
            return Err(ConciergeError::Tool(
                "current_time takes no positional arguments".into(),
            ));
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(ToolResult::success(&call.id, now))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_current_time() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CurrentTimeTool::new()));

        let result = registry
            .execute("t1", &call("current_time", serde_json::json!({})))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.call_id, "call_1");
        assert!(chrono::DateTime::parse_from_rfc3339(&result.content).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute("t1", &call("create_payment_link", serde_json::json!({})))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("create_payment_link"));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CurrentTimeTool::new()));
        let result = registry
            .execute("t1", &call("current_time", serde_json::json!([1, 2])))
            .await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Tool error:"));
    }

    #[test]
    fn test_schemas_sorted_by_name() {
        struct Named(ToolSchema);

        #[async_trait]
        impl Tool for Named {
            fn schema(&self) -> &ToolSchema {
                &self.0
            }
            async fn execute(&self, _: &str, call: &ToolCall) -> ConciergeResult<ToolResult> {
                Ok(ToolResult::success(&call.id, ""))
            }
        }

        let mut registry = ToolRegistry::new();
        for name in ["lookup_product", "current_time", "create_payment_link"] {
            registry.register(Arc::new(Named(ToolSchema {
                name: name.into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object"}),
            })));
        }
        let names: Vec<_> = registry.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["create_payment_link", "current_time", "lookup_product"]);
        assert_eq!(registry.tool_count(), 3);
        assert!(registry.get("current_time").is_some());
    }
}
