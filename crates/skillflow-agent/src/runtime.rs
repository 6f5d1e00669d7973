//! ReactAgent - the model/tool loop
//!
//! One `call` sends the conversation to the model, runs any tools it asks
//! for, feeds the results back, and repeats until the model answers with
//! text alone or the round cap is hit.

use crate::conversation::Conversation;
use crate::hooks::{AgentHook, ToolCallView};
use crate::memory::ConversationStore;
use crate::SessionKey;
use serde_json::Value;
use skillflow_llm::{AccumulatedToolCall, ContentBlock, LlmError, LlmProvider, LlmRequest, Usage};
use skillflow_tools::{ToolContext, ToolRegistry, ToolResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tool output beyond this many chars is cut before it reaches the model.
pub const MAX_TOOL_RESULT_CHARS: usize = 50_000;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("no final answer after {0} tool rounds")]
    MaxToolRounds(usize),

    #[error("hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },
}

/// The final answer of one `call`.
#[derive(Clone, Debug, Default)]
pub struct AssistantMessage {
    pub text: String,
    pub tool_rounds: usize,
    pub usage: Usage,
}

pub struct ReactAgent {
    name: String,
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: Option<String>,
    tools: Option<Arc<ToolRegistry>>,
    hooks: Vec<Arc<dyn AgentHook>>,
    memory: Option<(Arc<dyn ConversationStore>, SessionKey)>,
    extras: BTreeMap<String, Value>,
    max_tool_rounds: usize,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

pub struct ReactAgentBuilder {
    agent: ReactAgent,
}

impl ReactAgentBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.agent.system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.agent.tools = Some(tools);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.agent.hooks.push(hook);
        self
    }

    /// Keep history in `store` under `session` across calls.
    pub fn memory(mut self, store: Arc<dyn ConversationStore>, session: SessionKey) -> Self {
        self.agent.memory = Some((store, session));
        self
    }

    /// A value every tool call will see in its [`ToolContext`].
    pub fn context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.agent.extras.insert(key.into(), value);
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.agent.max_tool_rounds = rounds;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.agent.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.agent.temperature = temperature;
        self
    }

    pub fn build(self) -> ReactAgent {
        self.agent
    }
}

impl ReactAgent {
    pub fn builder(name: impl Into<String>, provider: Arc<dyn LlmProvider>) -> ReactAgentBuilder {
        let defaults = LlmRequest::default();
        ReactAgentBuilder {
            agent: ReactAgent {
                name: name.into(),
                provider,
                model: defaults.model,
                system_prompt: None,
                tools: None,
                hooks: Vec::new(),
                memory: None,
                extras: BTreeMap::new(),
                max_tool_rounds: 10,
                max_tokens: defaults.max_tokens,
                temperature: None,
            },
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn max_tool_rounds(&self) -> usize { self.max_tool_rounds }

    pub async fn call(&self, user_message: &str) -> Result<AssistantMessage, AgentError> {
        let mut conversation = match &self.memory {
            Some((store, session)) => Conversation::from_messages(store.load(session).await),
            None => Conversation::new(),
        };
        conversation.push_user(user_message);

        let result = self.run_loop(&mut conversation).await;

        // A failed call may end on a tool_use with no tool_result; keep the
        // stored history as it was.
        if let (Some((store, session)), Ok(_)) = (&self.memory, &result) {
            store.save(session, conversation.into_messages()).await;
        }
        result
    }

    async fn run_loop(&self, conversation: &mut Conversation) -> Result<AssistantMessage, AgentError> {
        let definitions = self
            .tools
            .as_ref()
            .map(|t| t.get_definitions())
            .filter(|d| !d.is_empty());
        let mut usage = Usage::default();
        let mut rounds = 0;

        loop {
            let mut request = LlmRequest {
                model: self.model.clone(),
                messages: conversation.messages().to_vec(),
                tools: definitions.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system: self.system_prompt.clone(),
            };
            for hook in &self.hooks {
                hook.before_model(&mut request).await.map_err(|m| hook_error(hook.as_ref(), m))?;
            }

            debug!(agent = %self.name, round = rounds, messages = request.messages.len(), "calling model");
            let completion = self.provider.complete(request).await?;
            if let Some(u) = &completion.usage {
                usage.input_tokens += u.input_tokens;
                usage.output_tokens += u.output_tokens;
            }

            for hook in &self.hooks {
                hook.after_model(&completion).await.map_err(|m| hook_error(hook.as_ref(), m))?;
            }

            if !completion.wants_tools() {
                conversation.push_assistant_text(&completion.text);
                info!(agent = %self.name, tool_rounds = rounds, "agent finished");
                return Ok(AssistantMessage { text: completion.text, tool_rounds: rounds, usage });
            }

            if rounds >= self.max_tool_rounds {
                warn!(agent = %self.name, max = self.max_tool_rounds, "tool round cap reached");
                return Err(AgentError::MaxToolRounds(self.max_tool_rounds));
            }
            rounds += 1;

            let calls: Vec<(AccumulatedToolCall, Result<Value, String>)> = completion
                .tool_calls
                .into_iter()
                .map(|tc| {
                    let args = tc.parse_arguments().map_err(|e| e.to_string());
                    (tc, args)
                })
                .collect();

            let blocks = calls
                .iter()
                .map(|(tc, args)| ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: args.clone().unwrap_or_default(),
                })
                .collect();
            let text = Some(completion.text.as_str()).filter(|t| !t.is_empty());
            conversation.push_assistant_with_tools(text, blocks);

            for (tc, args) in &calls {
                let result = self.run_tool(tc, args).await?;
                let is_error = result.is_error();
                let content = truncate_result(result.to_content_string());
                conversation.push_tool_result(&tc.id, &content, is_error);
            }

            debug!(agent = %self.name, round = rounds, "tool round complete");
        }
    }

    async fn run_tool(
        &self,
        tc: &AccumulatedToolCall,
        args: &Result<Value, String>,
    ) -> Result<ToolResult, AgentError> {
        let null = Value::Null;
        let view = ToolCallView {
            agent: &self.name,
            call_id: &tc.id,
            tool: &tc.name,
            args: args.as_ref().unwrap_or(&null),
        };
        for hook in &self.hooks {
            hook.before_tool(&view).await.map_err(|m| hook_error(hook.as_ref(), m))?;
        }

        let mut result = match (self.tools.as_ref().filter(|t| t.contains(&tc.name)), args) {
            (None, _) => {
                let available = self.tools.as_ref().map(|t| t.list().join(", ")).unwrap_or_default();
                warn!(agent = %self.name, tool = %tc.name, "model asked for an unknown tool");
                ToolResult::error(format!("unknown tool '{}'. Available tools: {}", tc.name, available))
            }
            (Some(_), Err(e)) => ToolResult::error(format!("invalid arguments for '{}': {}", tc.name, e)),
            (Some(tools), Ok(args)) => {
                let mut ctx = ToolContext::new(&self.name).with_call_id(&tc.id);
                ctx.extras = self.extras.clone();
                if let Some((_, session)) = &self.memory {
                    ctx = ctx.with_session(session.clone());
                }
                tools.execute(&tc.name, args, &ctx).await
            }
        };

        for hook in &self.hooks {
            hook.after_tool(&view, &mut result).await.map_err(|m| hook_error(hook.as_ref(), m))?;
        }
        Ok(result)
    }
}

fn hook_error(hook: &dyn AgentHook, message: String) -> AgentError {
    AgentError::Hook { hook: hook.name().to_string(), message }
}

fn truncate_result(content: String) -> String {
    match content.char_indices().nth(MAX_TOOL_RESULT_CHARS) {
        Some((cut, _)) => format!(
            "{}...\n[truncated, {} total chars]",
            &content[..cut],
            content.chars().count()
        ),
        None => content,
    }
}
