//! Tool registry and trait definitions
//!
//! Tools take a single text input. Whatever JSON arguments the model sends
//! are flattened to that text by [`input_from_args`] before the tool runs.

use serde_json::{json, Value};
use skillflow_core::SessionKey;
use skillflow_llm::LlmTool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }
    pub fn error(s: impl Into<String>) -> Self { Self::Error(s.into()) }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => format!("Error: {}", e),
        }
    }

    pub fn is_error(&self) -> bool { matches!(self, Self::Error(_)) }
}

/// Per-call information handed to a tool: who is calling, in which
/// conversation, plus free-form values the caller attached to the agent.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub agent: String,
    pub session: Option<SessionKey>,
    pub call_id: String,
    pub extras: BTreeMap<String, Value>,
}

impl ToolContext {
    pub fn new(agent: impl Into<String>) -> Self {
        Self { agent: agent.into(), ..Default::default() }
    }

    pub fn with_session(mut self, session: SessionKey) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }
}

/// The Tool trait. Implement this to add a capability the model can call.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as the model sees it.
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments. Defaults to one string field `input`.
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "Input for the tool" }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult;

    fn to_llm_tool(&self) -> LlmTool {
        LlmTool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Flatten model-supplied arguments into the tool's text input.
///
/// `{"input": "x"}` gives `x`, a bare JSON string gives itself, and
/// anything else is passed on as its JSON text.
pub fn input_from_args(args: &Value) -> String {
    match args {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("input") {
            Some(Value::String(s)) if map.len() == 1 => s.clone(),
            _ => args.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: HashMap::new() } }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replaced registered tool");
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: &Value, ctx: &ToolContext) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(&input_from_args(args), ctx).await,
            None => ToolResult::Error(format!("Tool not found: {}", name)),
        }
    }

    /// LLM tool definitions, sorted by name.
    pub fn get_definitions(&self) -> Vec<LlmTool> {
        let mut defs: Vec<LlmTool> = self.tools.values().map(|t| t.to_llm_tool()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize { self.tools.len() }

    pub fn is_empty(&self) -> bool { self.tools.is_empty() }
}

type ToolFn = dyn Fn(&str, &ToolContext) -> String + Send + Sync;

/// A tool backed by a plain closure, for externally provisioned capabilities.
pub struct FnTool {
    name: String,
    description: String,
    f: Arc<ToolFn>,
}

impl FnTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        f: impl Fn(&str, &ToolContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), description: description.into(), f: Arc::new(f) }
    }
}

#[async_trait::async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str { &self.name }

    fn description(&self) -> &str { &self.description }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        ToolResult::Text((self.f)(input, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_from_args_shapes() {
        assert_eq!(input_from_args(&json!({"input": "semiconductor"})), "semiconductor");
        assert_eq!(input_from_args(&json!("bare")), "bare");
        assert_eq!(input_from_args(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(input_from_args(&json!({"input": "x", "extra": true})), r#"{"extra":true,"input":"x"}"#);
        assert_eq!(input_from_args(&Value::Null), "");
    }
}
