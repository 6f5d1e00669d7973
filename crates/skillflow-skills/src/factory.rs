//! Fresh agents on demand
//!
//! Every step, node and synthesis call gets its own `ReactAgent` so no
//! conversation leaks between them. The factory holds what they share.

use skillflow_agent::{AgentHook, ReactAgent};
use skillflow_core::SkillflowConfig;
use skillflow_llm::{LlmProvider, LlmRequest};
use skillflow_tools::ToolRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AgentFactory {
    provider: Arc<dyn LlmProvider>,
    model: String,
    tools: Option<Arc<ToolRegistry>>,
    hooks: Vec<Arc<dyn AgentHook>>,
    max_tool_rounds: usize,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl AgentFactory {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let defaults = LlmRequest::default();
        Self {
            provider,
            model: defaults.model,
            tools: None,
            hooks: Vec::new(),
            max_tool_rounds: 10,
            max_tokens: defaults.max_tokens,
            temperature: None,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &SkillflowConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            max_tool_rounds: config.agent.max_tool_rounds,
            max_tokens: Some(config.llm.max_tokens),
            temperature: config.llm.temperature,
            ..Self::new(provider)
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Same settings, no tools bound.
    pub fn without_tools(&self) -> Self {
        Self { tools: None, ..self.clone() }
    }

    pub fn tools(&self) -> Option<&Arc<ToolRegistry>> { self.tools.as_ref() }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .as_ref()
            .map(|t| t.list().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn build(&self, name: &str, system_prompt: &str) -> ReactAgent {
        let mut builder = ReactAgent::builder(name, self.provider.clone())
            .model(&self.model)
            .system_prompt(system_prompt)
            .max_tool_rounds(self.max_tool_rounds)
            .temperature(self.temperature);
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(tools) = &self.tools {
            builder = builder.tools(tools.clone());
        }
        for hook in &self.hooks {
            builder = builder.hook(hook.clone());
        }
        builder.build()
    }
}
