//! Agent hooks: observe or adjust model and tool calls
//!
//! Hooks run in registration order. Any hook returning `Err` aborts the
//! current `call` with [`AgentError::Hook`](crate::AgentError::Hook).

use serde_json::Value;
use skillflow_llm::{Completion, LlmRequest};
use skillflow_tools::ToolResult;
use tracing::{debug, info};

pub type HookResult = Result<(), String>;

/// A tool call as hooks see it.
#[derive(Clone, Copy, Debug)]
pub struct ToolCallView<'a> {
    pub agent: &'a str,
    pub call_id: &'a str,
    pub tool: &'a str,
    pub args: &'a Value,
}

#[async_trait::async_trait]
pub trait AgentHook: Send + Sync {
    fn name(&self) -> &str;

    async fn before_model(&self, _request: &mut LlmRequest) -> HookResult { Ok(()) }

    async fn after_model(&self, _completion: &Completion) -> HookResult { Ok(()) }

    async fn before_tool(&self, _call: &ToolCallView<'_>) -> HookResult { Ok(()) }

    async fn after_tool(&self, _call: &ToolCallView<'_>, _result: &mut ToolResult) -> HookResult { Ok(()) }
}

/// Emits a structured event for every model and tool call.
pub struct TracingHook {
    agent: String,
}

impl TracingHook {
    pub fn new(agent: impl Into<String>) -> Self {
        Self { agent: agent.into() }
    }
}

#[async_trait::async_trait]
impl AgentHook for TracingHook {
    fn name(&self) -> &str { "tracing" }

    async fn before_model(&self, request: &mut LlmRequest) -> HookResult {
        debug!(
            agent = %self.agent,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, |t| t.len()),
            "model_request"
        );
        Ok(())
    }

    async fn after_model(&self, completion: &Completion) -> HookResult {
        info!(
            agent = %self.agent,
            text_chars = completion.text.chars().count(),
            tool_calls = completion.tool_calls.len(),
            stop_reason = completion.stop_reason.as_deref().unwrap_or("-"),
            "model_response"
        );
        Ok(())
    }

    async fn before_tool(&self, call: &ToolCallView<'_>) -> HookResult {
        info!(agent = %call.agent, tool = %call.tool, call_id = %call.call_id, args = %call.args, "tool_call");
        Ok(())
    }

    async fn after_tool(&self, call: &ToolCallView<'_>, result: &mut ToolResult) -> HookResult {
        info!(
            agent = %call.agent,
            tool = %call.tool,
            call_id = %call.call_id,
            is_error = result.is_error(),
            "tool_result"
        );
        Ok(())
    }
}
