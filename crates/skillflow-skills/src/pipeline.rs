//! The instructions pipeline
//!
//! `START -> convert-to-instructions -> execute-instructions -> END`.
//! The first node rewrites the user's prompt as a SKILL.md-style document,
//! the second carries it out with the tools bound and reports each step.

use crate::factory::AgentFactory;
use serde_json::{json, Value};
use skillflow_graph::{
    CompileConfig, CompiledGraph, GraphResult, KeyStrategy, NodeAction, NodeError, PartialState, SharedState, StateGraph,
    END, START,
};
use tracing::info;

pub const CONVERT_NODE: &str = "convert-to-instructions";
pub const EXECUTE_NODE: &str = "execute-instructions";

pub const USER_PROMPT_KEY: &str = "user_prompt";
pub const INSTRUCTIONS_KEY: &str = "instructions";
pub const EXECUTION_RESULT_KEY: &str = "execution_result";
/// Names of the nodes that ran, in order.
pub const TRACE_KEY: &str = "trace";

const CONVERT_PROMPT: &str = "You are a senior AI engineer. Rewrite the user's request as a skill document \
the model can follow to solve it. Use the standard SKILL.md layout:\n\n\
---\nname: your-skill-name\ndescription: What it does and when to use it\n---\n\n\
# Skill Title\n\n## Instructions\nOne step per line, each naming its tool as `invoke tool <name>`.\n\n\
## Examples\n- Example usage\n\n## Guidelines\n- Guideline\n\n\
If a step needs a tool that is not available, say so and describe how it should be implemented.";

const EXECUTE_PROMPT: &str = "Role: skill executor.\n\
- Carry out the document step by step, calling the tool each step names.\n\
- If no matching tool exists, report \"tool not found\" for that step.\n\
- Report the input and output of every step.\n\
- Answer in JSON.";

fn required<'a>(state: &'a SharedState, key: &str) -> Result<&'a str, NodeError> {
    state.get_str(key).ok_or_else(|| format!("missing state key '{}'", key).into())
}

fn output(key: &str, value: String, node: &str) -> PartialState {
    PartialState::from([(key.to_string(), Value::String(value)), (TRACE_KEY.to_string(), json!(node))])
}

pub struct ConvertNode {
    agents: AgentFactory,
    tool_names: Vec<String>,
}

impl ConvertNode {
    pub fn new(agents: &AgentFactory) -> Self {
        Self { tool_names: agents.tool_names(), agents: agents.without_tools() }
    }

    fn system_prompt(&self) -> String {
        if self.tool_names.is_empty() {
            return CONVERT_PROMPT.to_string();
        }
        format!("{}\n\nAvailable tools: {}", CONVERT_PROMPT, self.tool_names.join(", "))
    }
}

#[async_trait::async_trait]
impl NodeAction for ConvertNode {
    async fn apply(&self, state: &SharedState) -> Result<PartialState, NodeError> {
        let prompt = required(state, USER_PROMPT_KEY)?;
        let agent = self.agents.build("instructions-writer", &self.system_prompt());
        let message = agent.call(prompt).await?;
        info!(node = CONVERT_NODE, chars = message.text.chars().count(), "instructions written");
        Ok(output(INSTRUCTIONS_KEY, message.text, CONVERT_NODE))
    }
}

pub struct ExecuteNode {
    agents: AgentFactory,
}

impl ExecuteNode {
    pub fn new(agents: &AgentFactory) -> Self {
        Self { agents: agents.clone() }
    }
}

#[async_trait::async_trait]
impl NodeAction for ExecuteNode {
    async fn apply(&self, state: &SharedState) -> Result<PartialState, NodeError> {
        let instructions = required(state, INSTRUCTIONS_KEY)?;
        let agent = self.agents.build("instructions-executor", EXECUTE_PROMPT);
        let message = agent.call(instructions).await?;
        info!(node = EXECUTE_NODE, tool_rounds = message.tool_rounds, "instructions executed");
        Ok(output(EXECUTION_RESULT_KEY, message.text, EXECUTE_NODE))
    }
}

pub fn build_instructions_pipeline(agents: &AgentFactory, config: CompileConfig) -> GraphResult<CompiledGraph> {
    let mut graph = StateGraph::with_strategies([
        (USER_PROMPT_KEY, KeyStrategy::Replace),
        (INSTRUCTIONS_KEY, KeyStrategy::Replace),
        (EXECUTION_RESULT_KEY, KeyStrategy::Replace),
        (TRACE_KEY, KeyStrategy::Append),
    ]);
    graph.add_node(CONVERT_NODE, ConvertNode::new(agents))?;
    graph.add_node(EXECUTE_NODE, ExecuteNode::new(agents))?;
    graph
        .add_edge(START, CONVERT_NODE)
        .add_edge(CONVERT_NODE, EXECUTE_NODE)
        .add_edge(EXECUTE_NODE, END);
    graph.compile(config)
}

/// The seed state for one pipeline run.
pub fn pipeline_seed(prompt: &str) -> PartialState {
    PartialState::from([(USER_PROMPT_KEY.to_string(), Value::String(prompt.to_string()))])
}
