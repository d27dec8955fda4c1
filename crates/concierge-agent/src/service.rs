use crate::context::ContextWindow;
use crate::failover::{FallbackInvoker, Invocation};
use crate::tools::ToolExecutor;
use concierge_core::{AttemptFailure, ConciergeError, ConciergeResult, Message};
use concierge_security::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_MAX_HISTORY: usize = 20;

/// The assistant's reply to one customer message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// The answer shown to the customer.
    pub text: String,
    /// Name of the provider that answered.
    pub provider: String,
    /// Position of that provider in the fallback order.
    pub provider_index: usize,
    /// Provider failures absorbed on the way, in attempt order.
    pub failed_attempts: Vec<AttemptFailure>,
    /// Number of tool calls executed for this reply.
    pub tool_calls: usize,
}

/// Answers customer messages for many tenants.
///
/// Each reply is admitted by the shared [`RateLimiter`], then handed to the
/// [`FallbackInvoker`]. Tool requests are executed through the
/// [`ToolExecutor`] and fed back until some provider answers.
pub struct ChatService {
    limiter: Arc<RateLimiter>,
    invoker: FallbackInvoker,
    tools: Arc<dyn ToolExecutor>,
    system_prompt: Option<String>,
    max_history: usize,
    request_timeout: Option<Duration>,
}

impl ChatService {
    /// A service with no system prompt, no deadline and the default history size.
    pub fn new(
        limiter: Arc<RateLimiter>,
        invoker: FallbackInvoker,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            limiter,
            invoker,
            tools,
            system_prompt: None,
            max_history: DEFAULT_MAX_HISTORY,
            request_timeout: None,
        }
    }

    /// Instructions placed before every conversation.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Number of newest history messages sent to providers.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Bound a whole reply, tool calls included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The provider fallback chain.
    pub fn invoker(&self) -> &FallbackInvoker {
        &self.invoker
    }

    /// Reply to the last message of `history` on behalf of `tenant_id`.
    ///
    /// Fails with [`ConciergeError::RateLimited`] before any provider is
    /// called when the tenant is over quota, and with
    /// [`ConciergeError::Cancelled`] when `cancel` fires or the request
    /// timeout elapses.
    pub async fn reply(
        &self,
        tenant_id: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> ConciergeResult<ChatReply> {
        self.limiter.check(tenant_id).into_result()?;

        let conversation = self.conversation(history);
        let exchange = self.exchange(tenant_id, &conversation, cancel);

        match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        tenant = %tenant_id,
                        timeout_secs = limit.as_secs(),
                        "Reply timed out"
                    );
                    Err(ConciergeError::Cancelled)
                }
            },
            None => exchange.await,
        }
    }

    fn conversation(&self, history: &[Message]) -> Vec<Message> {
        let mut context = ContextWindow::new(self.max_history);
        if let Some(prompt) = &self.system_prompt {
            context.set_system_prompt(prompt.clone());
        }
        context.extend(history.iter().cloned());
        context.conversation()
    }

    async fn exchange(
        &self,
        tenant_id: &str,
        conversation: &[Message],
        cancel: &CancellationToken,
    ) -> ConciergeResult<ChatReply> {
        let tools = self.tools.schemas();
        let mut tool_calls = 0;
        let mut invocation = self.invoker.invoke(conversation, &tools, cancel).await?;

        // Terminates: every continuation either answers, hands a tool request
        // to a strictly later provider, or exhausts the list.
        loop {
            match invocation {
                Invocation::Answered(answer) => {
                    info!(
                        tenant = %tenant_id,
                        provider = %answer.provider,
                        provider_index = answer.provider_index,
                        tool_calls,
                        "Reply ready"
                    );
                    return Ok(ChatReply {
                        text: answer.text,
                        provider: answer.provider,
                        provider_index: answer.provider_index,
                        failed_attempts: answer.failed_attempts,
                        tool_calls,
                    });
                }
                Invocation::ToolRequested(pending) => {
                    tool_calls += 1;
                    info!(
                        tenant = %tenant_id,
                        provider = %pending.provider,
                        tool = %pending.call.name,
                        "Executing tool"
                    );
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ConciergeError::Cancelled),
                        result = self.tools.execute(tenant_id, &pending.call) => result,
                    };
                    invocation = self
                        .invoker
                        .invoke_with_tool_result(pending, conversation, &tools, result, cancel)
                        .await?;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::provider::{Completion, Provider, ProviderFailure};
    use crate::tools::{CurrentTimeTool, Tool, ToolRegistry};
    use async_trait::async_trait;
    use concierge_core::{Role, ToolCall, ToolResult, ToolSchema};

    type Seen = Arc<tokio::sync::Mutex<Vec<Vec<Message>>>>;

    struct ScriptedProvider {
        name: &'static str,
        script: tokio::sync::Mutex<Vec<Result<Completion, ProviderFailure>>>,
        seen: Seen,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(
            &self,
            conversation: &[Message],
            _tools: &[ToolSchema],
        ) -> Result<Completion, ProviderFailure> {
            self.seen.lock().await.push(conversation.to_vec());
            let mut script = self.script.lock().await;
            if script.is_empty() {
                Err(ProviderFailure::non_retryable("script exhausted"))
            } else {
                script.remove(0)
            }
        }
    }

    fn scripted(
        name: &'static str,
        script: Vec<Result<Completion, ProviderFailure>>,
        seen: &Seen,
    ) -> Arc<dyn Provider> {
        Arc::new(ScriptedProvider {
            name,
            script: tokio::sync::Mutex::new(script),
            seen: Arc::clone(seen),
        })
    }

    struct SlowProvider;

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _conversation: &[Message],
            _tools: &[ToolSchema],
        ) -> Result<Completion, ProviderFailure> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Completion::Answer("late".into()))
        }
    }

    /// Looks up stock in a warehouse that takes a minute to answer.
    struct SlowStockTool {
        schema: ToolSchema,
    }

    impl SlowStockTool {
        fn new() -> Self {
            Self {
                schema: ToolSchema {
                    name: "stock_level".into(),
                    description: "Stock level for a SKU".into(),
                    parameters: serde_json::json!({"type": "object"}),
                },
            }
        }
    }

    #[async_trait]
    impl Tool for SlowStockTool {
        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        async fn execute(&self, _tenant_id: &str, call: &ToolCall) -> ConciergeResult<ToolResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult::success(&call.id, "12 in stock"))
        }
    }

    fn registry() -> Arc<dyn ToolExecutor> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CurrentTimeTool::new()));
        Arc::new(registry)
    }

    fn service(providers: Vec<Arc<dyn Provider>>, limit: u32) -> ChatService {
        ChatService::new(
            Arc::new(RateLimiter::new(limit)),
            FallbackInvoker::new(providers).unwrap(),
            registry(),
        )
    }

    fn time_request() -> Result<Completion, ProviderFailure> {
        Ok(Completion::ToolRequest {
            content: None,
            call: ToolCall {
                id: "call_1".into(),
                name: "current_time".into(),
                arguments: serde_json::json!({}),
            },
        })
    }

    fn new_seen() -> Seen {
        Arc::new(tokio::sync::Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_reply_with_system_prompt() {
        let seen = new_seen();
        let svc = service(
            vec![scripted("primary", vec![Ok(Completion::Answer("Hi!".into()))], &seen)],
            0,
        )
        .with_system_prompt("You are the shop assistant.");

        let reply = svc
            .reply("acme", &[Message::user("hello")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.text, "Hi!");
        assert_eq!(reply.provider, "primary");
        assert_eq!(reply.tool_calls, 0);

        let seen = seen.lock().await;
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[0][1].content, "hello");
    }

    #[tokio::test]
    async fn test_tool_loop() {
        let seen = new_seen();
        let svc = service(
            vec![scripted(
                "primary",
                vec![time_request(), Ok(Completion::Answer("It is noon.".into()))],
                &seen,
            )],
            0,
        );

        let reply = svc
            .reply("acme", &[Message::user("what time is it?")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.text, "It is noon.");
        assert_eq!(reply.tool_calls, 1);

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        let continuation = &seen[1];
        assert_eq!(continuation.len(), 3);
        assert_eq!(continuation[1].role, Role::Assistant);
        assert_eq!(continuation[2].role, Role::Tool);
        assert!(!continuation[2].is_tool_error());
    }

    #[tokio::test]
    async fn test_fallback_reported_in_reply() {
        let seen = new_seen();
        let svc = service(
            vec![
                scripted("primary", vec![Err(ProviderFailure::retryable("503"))], &seen),
                scripted("backup", vec![Ok(Completion::Answer("ok".into()))], &seen),
            ],
            0,
        );
        let reply = svc
            .reply("acme", &[Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.provider_index, 1);
        assert_eq!(reply.failed_attempts.len(), 1);
        assert_eq!(reply.failed_attempts[0].provider, "primary");
    }

    #[tokio::test]
    async fn test_rate_limited_before_any_provider_call() {
        let seen = new_seen();
        let svc = service(
            vec![scripted("primary", vec![Ok(Completion::Answer("one".into()))], &seen)],
            1,
        );
        let cancel = CancellationToken::new();

        svc.reply("acme", &[Message::user("1")], &cancel).await.unwrap();
        let err = svc.reply("acme", &[Message::user("2")], &cancel).await.unwrap_err();
        assert!(matches!(err, ConciergeError::RateLimited { retry_after_secs } if retry_after_secs >= 1));
        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_propagates() {
        let seen = new_seen();
        let svc = service(
            vec![scripted("primary", vec![Err(ProviderFailure::non_retryable("401"))], &seen)],
            0,
        );
        let err = svc
            .reply("acme", &[Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ConciergeError::Exhausted(exhausted) => {
                assert_eq!(exhausted.attempts.len(), 1);
                assert!(exhausted.all_non_retryable());
            }
            other => panic!("Expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_is_cancelled() {
        let svc = service(vec![Arc::new(SlowProvider) as Arc<dyn Provider>], 0)
            .with_request_timeout(Duration::from_secs(5));
        let err = svc
            .reply("acme", &[Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Cancelled));
    }

    #[tokio::test]
    async fn test_history_truncated() {
        let seen = new_seen();
        let svc = service(
            vec![scripted("primary", vec![Ok(Completion::Answer("ok".into()))], &seen)],
            0,
        )
        .with_max_history(2);
        let history: Vec<Message> = (0..6).map(|i| Message::user(format!("m{i}"))).collect();

        svc.reply("acme", &history, &CancellationToken::new())
            .await
            .unwrap();
        let seen = seen.lock().await;
        let contents: Vec<_> = seen[0].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_tool_skips_continuation() {
        let seen = new_seen();
        let stock_request = Ok(Completion::ToolRequest {
            content: None,
            call: ToolCall {
                id: "call_1".into(),
                name: "stock_level".into(),
                arguments: serde_json::json!({"sku": "MUG-01"}),
            },
        });
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(SlowStockTool::new()));
        let svc = ChatService::new(
            Arc::new(RateLimiter::new(0)),
            FallbackInvoker::new(vec![scripted(
                "primary",
                vec![stock_request, Ok(Completion::Answer("12 left".into()))],
                &seen,
            )])
            .unwrap(),
            Arc::new(tools),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = svc
            .reply("acme", &[Message::user("Any mugs left?")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Cancelled));
        assert_eq!(seen.lock().await.len(), 1);
    }
}
