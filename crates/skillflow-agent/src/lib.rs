//! skillflow agent - the reasoning-and-acting loop over an LLM and a tool registry

pub mod conversation;
pub mod hooks;
pub mod memory;
pub mod runtime;

pub use conversation::Conversation;
pub use hooks::{AgentHook, HookResult, ToolCallView, TracingHook};
pub use memory::{ConversationStore, InMemoryConversationStore};
pub use runtime::{AgentError, AssistantMessage, ReactAgent, ReactAgentBuilder};
pub use skillflow_core::SessionKey;
