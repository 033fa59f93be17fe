//! Tool subsystem for function-calling mode.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`]: a name, a
//! description, a JSON parameter schema and an async `execute` returning a
//! [`ToolResult`]. [`run_tool_loop`] drives a provider through tool calls
//! until it answers in text.

pub mod orders;
pub mod traits;

pub use orders::OrderTool;
pub use traits::{Tool, ToolResult};

use crate::error::{ParleyError, Result};
use crate::providers::{ChatMessage, ChatRequest, Provider, ToolCall, ToolSpec};
use std::sync::Arc;

/// Create the default tool registry (order status, cancellation, refund).
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(OrderTool::check_order_status()),
        Arc::new(OrderTool::process_cancellation()),
        Arc::new(OrderTool::process_refund()),
    ]
}

pub fn tool_specs(tools: &[Arc<dyn Tool>]) -> Vec<ToolSpec> {
    tools.iter().map(|tool| tool.spec()).collect()
}

async fn execute_call(tools: &[Arc<dyn Tool>], call: &ToolCall) -> ToolResult {
    let Some(tool) = tools.iter().find(|tool| tool.name() == call.name) else {
        return ToolResult::failed(format!("unknown tool: {}", call.name));
    };
    match serde_json::from_str::<serde_json::Value>(&call.arguments) {
        Ok(args) => tool.execute(args).await,
        Err(e) => ToolResult::failed(format!("arguments are not valid JSON: {e}")),
    }
}

/// Run completions until the model answers without tool calls.
///
/// `messages` is extended in place with every assistant and tool message, so
/// a caller keeping a transcript sees the whole exchange. Returns the final
/// text. Exceeding `max_iterations` completions is a `MalformedResponse`.
///
/// Tools have side effects, so once any tool has executed a failure is
/// reported as `AgentInvocationFailed`, which is never retried: rerunning the
/// loop would execute those tools again.
pub async fn run_tool_loop(
    provider: &dyn Provider,
    tools: &[Arc<dyn Tool>],
    messages: &mut Vec<ChatMessage>,
    max_iterations: usize,
) -> Result<String> {
    let specs = tool_specs(tools);
    let mut executed = 0usize;

    for iteration in 1..=max_iterations {
        let response = provider
            .chat(ChatRequest {
                messages: messages.as_slice(),
                tools: Some(&specs),
            })
            .await
            .map_err(|e| interrupted(executed, e))?;

        if !response.has_tool_calls() {
            let text = response.text_or_empty().to_string();
            messages.push(ChatMessage::assistant(text.clone()));
            return Ok(text);
        }

        tracing::debug!(
            iteration,
            calls = response.tool_calls.len(),
            "model requested tool calls"
        );
        messages.push(ChatMessage::assistant_tool_calls(
            response.text.clone(),
            response.tool_calls.clone(),
        ));
        for call in &response.tool_calls {
            let result = execute_call(tools, call).await;
            executed += 1;
            messages.push(ChatMessage::tool_result(&call.id, result.to_model_text()));
        }
    }

    Err(interrupted(
        executed,
        ParleyError::malformed(
            provider.name(),
            format!("no final answer after {max_iterations} tool iterations"),
        ),
    ))
}

fn interrupted(executed: usize, error: ParleyError) -> ParleyError {
    if executed == 0 {
        return error;
    }
    tracing::error!(executed, "tool-call sequence interrupted: {error}");
    ParleyError::AgentInvocationFailed {
        attempts: 1,
        reason: format!("interrupted after {executed} tool call(s): {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replays scripted responses in order.
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ChatResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _request: ChatRequest<'_>) -> Result<ChatResponse> {
            self.responses
                .lock()
                .pop()
                .ok_or_else(|| ParleyError::malformed("scripted", "script exhausted"))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn call(name: &str, args: &str) -> ChatResponse {
        ChatResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: name.into(),
                arguments: args.into(),
            }],
        }
    }

    fn text(t: &str) -> ChatResponse {
        ChatResponse {
            text: Some(t.into()),
            tool_calls: vec![],
        }
    }

    #[test]
    fn default_tools_names() {
        let names: Vec<String> = tool_specs(&default_tools()).into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["check_order_status", "process_cancellation", "process_refund"]
        );
    }

    #[tokio::test]
    async fn executes_tool_then_returns_final_text() {
        let provider = ScriptedProvider::new(vec![
            call("check_order_status", r#"{"order_id":"555"}"#),
            text("Your order 555 arrives in 2-3 days."),
        ]);
        let mut messages = vec![ChatMessage::user("where is order 555")];
        let answer = run_tool_loop(&provider, &default_tools(), &mut messages, 5)
            .await
            .unwrap();
        assert_eq!(answer, "Your order 555 arrives in 2-3 days.");
        let tool_message = messages.iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(
            tool_message.content.as_deref(),
            Some("Order 555 is shipped and will arrive in 2-3 days.")
        );
        assert_eq!(messages.last().unwrap().role, "assistant");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let provider = ScriptedProvider::new(vec![call("delete_everything", "{}"), text("Sorry.")]);
        let mut messages = vec![ChatMessage::user("hi")];
        run_tool_loop(&provider, &default_tools(), &mut messages, 5)
            .await
            .unwrap();
        assert!(messages
            .iter()
            .any(|m| m.content.as_deref() == Some("Error: unknown tool: delete_everything")));
    }

    #[tokio::test]
    async fn provider_failure_before_any_tool_keeps_its_kind() {
        let provider = ScriptedProvider::new(vec![]);
        let mut messages = vec![ChatMessage::user("hi")];
        let err = run_tool_loop(&provider, &default_tools(), &mut messages, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn iteration_cap_after_tools_ran_is_final() {
        let provider = ScriptedProvider::new(vec![
            call("process_refund", r#"{"order_id":"1"}"#),
            call("process_refund", r#"{"order_id":"1"}"#),
        ]);
        let mut messages = vec![ChatMessage::user("refund")];
        let err = run_tool_loop(&provider, &default_tools(), &mut messages, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::AgentInvocationFailed { .. }));
        assert!(!err.is_retryable());
    }
}
